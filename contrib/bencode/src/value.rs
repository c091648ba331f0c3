/// An owned bencode value.
///
/// Dictionaries are kept as a vector of `(key, value)` pairs instead of a
/// map: decoding preserves the (already sorted) wire order and encoding
/// writes entries back in exactly that order, which is what makes the
/// byte-for-byte round-trip hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(Vec<(Vec<u8>, Value)>),
}

impl Value {
    /// Builds a byte-string value from anything byte-like.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(bytes.into())
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dict(&self) -> Option<&[(Vec<u8>, Value)]> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Looks up `key` in a dictionary value. Returns `None` for non-dicts.
    #[must_use]
    pub fn lookup(&self, key: &[u8]) -> Option<&Value> {
        match self {
            Value::Dict(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn lookup_finds_entries_in_wire_order() {
        let dict = Value::Dict(vec![
            (b"a".to_vec(), Value::Int(1)),
            (b"b".to_vec(), Value::bytes("two")),
        ]);

        assert_eq!(dict.lookup(b"a"), Some(&Value::Int(1)));
        assert_eq!(dict.lookup(b"b").and_then(Value::as_str), Some("two"));
        assert_eq!(dict.lookup(b"c"), None);
    }

    #[test]
    fn lookup_on_a_non_dict_is_none() {
        assert_eq!(Value::Int(7).lookup(b"a"), None);
    }
}
