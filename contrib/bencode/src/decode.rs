use crate::error::Error;
use crate::value::Value;
use crate::{BEN_END, BYTE_LEN_END, DICT_START, INT_START, LIST_START, MAX_DEPTH};

/// Decodes a complete bencoded value.
///
/// The whole input must be consumed; trailing bytes are rejected. Use
/// [`decode_prefix`] when the value is embedded in a larger buffer.
///
/// # Errors
///
/// Returns an [`Error`] describing the first violation found, with the
/// byte position it occurred at.
pub fn decode(bytes: &[u8]) -> Result<Value, Error> {
    let (value, consumed) = decode_prefix(bytes)?;
    if consumed != bytes.len() {
        return Err(Error::InvalidFormat { pos: consumed });
    }
    Ok(value)
}

/// Decodes one bencoded value from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// Returns an [`Error`] describing the first violation found.
pub fn decode_prefix(bytes: &[u8]) -> Result<(Value, usize), Error> {
    decode_at(bytes, 0, 0)
}

fn decode_at(bytes: &[u8], pos: usize, depth: usize) -> Result<(Value, usize), Error> {
    if depth >= MAX_DEPTH {
        return Err(Error::InvalidFormat { pos });
    }

    match peek_byte(bytes, pos)? {
        INT_START => {
            let (n, next_pos) = decode_int(bytes, pos + 1, BEN_END)?;
            Ok((Value::Int(n), next_pos))
        }
        LIST_START => decode_list(bytes, pos + 1, depth),
        DICT_START => decode_dict(bytes, pos + 1, depth),
        b'0'..=b'9' => {
            let (data, next_pos) = decode_bytes(bytes, pos)?;
            let mut buf = Vec::new();
            buf.try_reserve_exact(data.len())
                .map_err(|_| Error::OutOfMemory { pos })?;
            buf.extend_from_slice(data);
            Ok((Value::Bytes(buf), next_pos))
        }
        _ => Err(Error::InvalidFormat { pos }),
    }
}

/// Parses the ASCII integer starting at `pos` up to `delim`.
///
/// Shared between `i..e` integers and byte-string length prefixes; the
/// canonical-form rules (no empty digits, no leading zeros, no `-0`) are
/// the same for both.
fn decode_int(bytes: &[u8], pos: usize, delim: u8) -> Result<(i64, usize), Error> {
    let remaining = &bytes[pos.min(bytes.len())..];

    let Some(relative_end) = remaining.iter().position(|b| *b == delim) else {
        return Err(Error::UnexpectedEnd { pos: bytes.len() });
    };
    let digits = &remaining[..relative_end];

    match digits {
        [] | [b'-'] => return Err(Error::InvalidInteger { pos }),
        [b'-', b'0'] => return Err(Error::NegativeZero { pos }),
        [b'-', b'0', ..] => return Err(Error::LeadingZero { pos }),
        [b'0', _, ..] => return Err(Error::LeadingZero { pos }),
        _ => {}
    }

    if !digits.iter().enumerate().all(|(i, b)| {
        b.is_ascii_digit() || (i == 0 && *b == b'-')
    }) {
        return Err(Error::InvalidInteger { pos });
    }

    // Only ASCII digits and an optional sign remain; from_utf8 cannot fail.
    let n = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(Error::InvalidInteger { pos })?;

    Ok((n, pos + relative_end + 1))
}

fn decode_bytes(bytes: &[u8], pos: usize) -> Result<(&[u8], usize), Error> {
    let (len, start_pos) = decode_int(bytes, pos, BYTE_LEN_END)?;

    let len = usize::try_from(len).map_err(|_| Error::InvalidStringLength { pos })?;
    if len > bytes.len() - start_pos {
        return Err(Error::InvalidStringLength { pos });
    }

    Ok((&bytes[start_pos..start_pos + len], start_pos + len))
}

fn decode_list(bytes: &[u8], pos: usize, depth: usize) -> Result<(Value, usize), Error> {
    let mut items = Vec::new();
    let mut curr_pos = pos;

    while peek_byte(bytes, curr_pos)? != BEN_END {
        let (value, next_pos) = decode_at(bytes, curr_pos, depth + 1)?;
        items
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory { pos: curr_pos })?;
        items.push(value);
        curr_pos = next_pos;
    }

    Ok((Value::List(items), curr_pos + 1))
}

fn decode_dict(bytes: &[u8], pos: usize, depth: usize) -> Result<(Value, usize), Error> {
    let mut entries: Vec<(Vec<u8>, Value)> = Vec::new();
    let mut curr_pos = pos;

    while peek_byte(bytes, curr_pos)? != BEN_END {
        let key_pos = curr_pos;
        let (key, next_pos) = decode_bytes(bytes, curr_pos)?;

        // Keys must be strictly increasing; equality means a duplicate.
        if let Some((last_key, _)) = entries.last() {
            if key <= last_key.as_slice() {
                return Err(Error::UnsortedDictKeys { pos: key_pos });
            }
        }
        curr_pos = next_pos;

        let (value, next_pos) = decode_at(bytes, curr_pos, depth + 1)?;
        entries
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory { pos: curr_pos })?;
        entries.push((key.to_vec(), value));
        curr_pos = next_pos;
    }

    Ok((Value::Dict(entries), curr_pos + 1))
}

fn peek_byte(bytes: &[u8], pos: usize) -> Result<u8, Error> {
    bytes.get(pos).copied().ok_or(Error::UnexpectedEnd { pos })
}
