use crate::value::Value;
use crate::{BEN_END, BYTE_LEN_END, DICT_START, INT_START, LIST_START};

/// Encodes a value into its bencoded byte representation.
///
/// Dictionary entries are written in the order the caller supplied them;
/// the encoder does not sort. Values produced by [`crate::decode`] are
/// already in sorted wire order, so decoding and re-encoding is the
/// identity on canonical input.
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Int(n) => {
            out.push(INT_START);
            out.extend_from_slice(n.to_string().as_bytes());
            out.push(BEN_END);
        }
        Value::Bytes(bytes) => encode_bytes(bytes, out),
        Value::List(items) => {
            out.push(LIST_START);
            for item in items {
                encode_into(item, out);
            }
            out.push(BEN_END);
        }
        Value::Dict(entries) => {
            out.push(DICT_START);
            for (key, item) in entries {
                encode_bytes(key, out);
                encode_into(item, out);
            }
            out.push(BEN_END);
        }
    }
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(BYTE_LEN_END);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::encode;
    use crate::{decode, Value};

    #[test]
    fn it_encodes_the_four_value_kinds() {
        assert_eq!(encode(&Value::Int(42)), b"i42e");
        assert_eq!(encode(&Value::Int(-42)), b"i-42e");
        assert_eq!(encode(&Value::Int(0)), b"i0e");
        assert_eq!(encode(&Value::bytes("spam")), b"4:spam");
        assert_eq!(
            encode(&Value::List(vec![Value::bytes("spam"), Value::Int(42)])),
            b"l4:spami42ee"
        );
        assert_eq!(
            encode(&Value::Dict(vec![
                (b"cow".to_vec(), Value::bytes("moo")),
                (b"spam".to_vec(), Value::Int(7)),
            ])),
            b"d3:cow3:moo4:spami7ee"
        );
    }

    #[test]
    fn it_preserves_caller_supplied_dict_order() {
        // Unsorted on purpose; the encoder must not reorder.
        let unsorted = Value::Dict(vec![
            (b"z".to_vec(), Value::Int(1)),
            (b"a".to_vec(), Value::Int(2)),
        ]);
        assert_eq!(encode(&unsorted), b"d1:zi1e1:ai2ee");
    }

    #[test]
    fn round_trip_is_the_identity_on_canonical_input() {
        let inputs: [&[u8]; 6] = [
            b"i500e",
            b"i-500e",
            b"0:",
            b"l10:test_bytesi500ei0ei-500el12:nested_bytesed8:test_key10:test_valueee",
            b"d9:test_dictd10:nested_key12:nested_value11:nested_listli500ei-500ei0eee8:test_key10:test_valuee",
            b"d1:ad1:bi1ee1:cli2eee",
        ];

        for input in inputs {
            let value = decode(input).unwrap();
            assert_eq!(encode(&value), input, "round-trip mismatch for {input:?}");
        }
    }

    #[test]
    fn round_trip_keeps_non_utf8_byte_strings_intact() {
        let input: &[u8] = b"5:\xC5\xE6\xBE\xE6\xF2";
        assert_eq!(encode(&decode(input).unwrap()), input);
    }
}
