//! Canonical bencode encoding and decoding.
//!
//! Bencode supports four data types: byte strings, integers, lists, and
//! dictionaries. Dictionary keys are always compared and emitted in
//! lexicographic byte order on encode. The decoder additionally tracks
//! the exact byte span of any top-level dictionary entry on request,
//! which is how the info hash is computed over the original bytes of
//! the `info` sub-dictionary rather than a re-encoded copy.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::{Error, Result};

/// A decoded or to-be-encoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
    /// Pre-encoded bencode bytes, copied verbatim on encode. Never
    /// produced by the decoder; constructed by callers (the modifier)
    /// that need to splice an original sub-dictionary's exact bytes back
    /// into a new outer dictionary without re-serializing it.
    Raw(Vec<u8>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Bytes(s.into().into_bytes())
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Decode a complete bencode value from `data`. Non-strict: accepts
    /// duplicate keys (last wins) and any dictionary key order.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data, false);
        let value = parser.parse_value()?;
        if parser.pos != data.len() {
            return Err(Error::BencodeDecode("trailing data after value".into()));
        }
        Ok(value)
    }

    /// Decode in strict mode: duplicate dictionary keys and
    /// non-lexicographic key order are errors.
    pub fn decode_strict(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data, true);
        let value = parser.parse_value()?;
        if parser.pos != data.len() {
            return Err(Error::BencodeDecode("trailing data after value".into()));
        }
        Ok(value)
    }

    /// Decode a top-level dictionary, additionally returning the exact
    /// byte span (within `data`) of the value stored under `key`, if
    /// present. Used to preserve the `info` sub-dictionary byte-for-byte
    /// for info-hash computation.
    pub fn decode_with_span(data: &[u8], key: &[u8]) -> Result<(Self, Option<Range<usize>>)> {
        let mut parser = Parser::new(data, false);
        parser.span_key = Some(key);
        let value = parser.parse_value()?;
        if parser.pos != data.len() {
            return Err(Error::BencodeDecode("trailing data after value".into()));
        }
        Ok((value, parser.found_span))
    }

    /// Encode this value to canonical bencode bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Int(i) => {
                out.push(b'i');
                out.extend_from_slice(i.to_string().as_bytes());
                out.push(b'e');
            }
            Value::Bytes(b) => {
                out.extend_from_slice(b.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(b);
            }
            Value::List(items) => {
                out.push(b'l');
                for item in items {
                    item.encode_into(out);
                }
                out.push(b'e');
            }
            Value::Dict(map) => {
                out.push(b'd');
                // BTreeMap<Vec<u8>, _> already iterates in lexicographic
                // byte order, which is exactly bencode's canonical order.
                for (k, v) in map {
                    Value::Bytes(k.clone()).encode_into(out);
                    v.encode_into(out);
                }
                out.push(b'e');
            }
            Value::Raw(bytes) => out.extend_from_slice(bytes),
        }
    }
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    strict: bool,
    span_key: Option<&'a [u8]>,
    found_span: Option<Range<usize>>,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8], strict: bool) -> Self {
        Parser {
            data,
            pos: 0,
            strict,
            span_key: None,
            found_span: None,
        }
    }

    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::BencodeDecode("unexpected end of input".into()))
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek()? {
            b'i' => self.parse_int(),
            b'l' => self.parse_list(),
            b'd' => self.parse_dict(),
            b'0'..=b'9' => self.parse_bytes().map(Value::Bytes),
            other => Err(Error::BencodeDecode(format!(
                "unexpected byte {:?} at offset {}",
                other as char, self.pos
            ))),
        }
    }

    fn parse_int(&mut self) -> Result<Value> {
        debug_assert_eq!(self.data[self.pos], b'i');
        self.pos += 1;
        let start = self.pos;
        if self.peek()? == b'-' {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.peek()? != b'e' {
            if !self.data[self.pos].is_ascii_digit() {
                return Err(Error::BencodeDecode("non-digit in integer".into()));
            }
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(Error::BencodeDecode("empty integer".into()));
        }
        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| Error::BencodeDecode("non-utf8 integer".into()))?;
        if text.len() > 1 && (text.starts_with('0') || text.starts_with("-0")) {
            return Err(Error::BencodeDecode("integer has leading zero".into()));
        }
        let value: i64 = text
            .parse()
            .map_err(|_| Error::BencodeDecode(format!("integer overflow: {text:?}")))?;
        self.pos += 1; // consume 'e'
        Ok(Value::Int(value))
    }

    fn parse_bytes(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        while self.peek()? != b':' {
            if !self.data[self.pos].is_ascii_digit() {
                return Err(Error::BencodeDecode("malformed byte-string length".into()));
            }
            self.pos += 1;
        }
        let len_text = std::str::from_utf8(&self.data[start..self.pos]).unwrap();
        let len: usize = len_text
            .parse()
            .map_err(|_| Error::BencodeDecode(format!("bad length {len_text:?}")))?;
        self.pos += 1; // consume ':'
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| Error::BencodeDecode("byte-string length overruns input".into()))?;
        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn parse_list(&mut self) -> Result<Value> {
        debug_assert_eq!(self.data[self.pos], b'l');
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            if self.peek()? == b'e' {
                self.pos += 1;
                break;
            }
            items.push(self.parse_value()?);
        }
        Ok(Value::List(items))
    }

    fn parse_dict(&mut self) -> Result<Value> {
        debug_assert_eq!(self.data[self.pos], b'd');
        self.pos += 1;
        let mut map = BTreeMap::new();
        let mut last_key: Option<Vec<u8>> = None;
        loop {
            if self.peek()? == b'e' {
                self.pos += 1;
                break;
            }
            let key = self.parse_bytes()?;
            if self.strict {
                if let Some(prev) = &last_key {
                    if key.as_slice() == prev.as_slice() {
                        return Err(Error::BencodeDecode(format!(
                            "duplicate dictionary key {:?}",
                            String::from_utf8_lossy(&key)
                        )));
                    }
                    if key.as_slice() < prev.as_slice() {
                        return Err(Error::BencodeDecode(format!(
                            "dictionary keys out of lexicographic order at {:?}",
                            String::from_utf8_lossy(&key)
                        )));
                    }
                }
            }
            let value_start = self.pos;
            let value = self.parse_value()?;
            let value_end = self.pos;
            if self.span_key == Some(key.as_slice()) && self.found_span.is_none() {
                self.found_span = Some(value_start..value_end);
            }
            last_key = Some(key.clone());
            map.insert(key, value);
        }
        Ok(Value::Dict(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_integer() {
        assert_eq!(Value::decode(b"i42e").unwrap(), Value::Int(42));
        assert_eq!(Value::decode(b"i-42e").unwrap(), Value::Int(-42));
        assert_eq!(Value::decode(b"i0e").unwrap(), Value::Int(0));
    }

    #[test]
    fn decode_rejects_leading_zero() {
        assert!(Value::decode(b"i03e").is_err());
        assert!(Value::decode(b"i-0e").is_err());
    }

    #[test]
    fn decode_string() {
        assert_eq!(
            Value::decode(b"4:spam").unwrap(),
            Value::Bytes(b"spam".to_vec())
        );
    }

    #[test]
    fn decode_list() {
        let value = Value::decode(b"l4:spami42ee").unwrap();
        match value {
            Value::List(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0], Value::Bytes(b"spam".to_vec()));
                assert_eq!(items[1], Value::Int(42));
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn decode_dict_sorts_on_reencode() {
        let value = Value::decode(b"d3:zoo3:bar3:foo3:bazee").unwrap();
        let reencoded = value.encode();
        // 'foo' < 'zoo' lexicographically
        assert_eq!(reencoded, b"d3:foo3:baze3:zoo3:baree".to_vec());
    }

    #[test]
    fn strict_rejects_duplicate_keys() {
        let data = b"d3:foo3:bar3:foo3:bazee";
        assert!(Value::decode_strict(data).is_err());
        assert!(Value::decode(data).is_ok());
    }

    #[test]
    fn strict_rejects_out_of_order_keys() {
        let data = b"d3:zoo3:bar3:foo3:bazee";
        assert!(Value::decode_strict(data).is_err());
    }

    #[test]
    fn roundtrip_is_byte_identical() {
        let original = b"d4:infod6:lengthi1000e4:name4:teste6:pieces0:e";
        let value = Value::decode(original).unwrap();
        assert_eq!(value.encode(), original.to_vec());
    }

    #[test]
    fn decode_with_span_recovers_exact_info_bytes() {
        let data = b"d8:announce4:http4:infod4:name4:teste4:meh!i1ee";
        let (_value, span) = Value::decode_with_span(data, b"info").unwrap();
        let span = span.unwrap();
        assert_eq!(&data[span], &b"d4:name4:teste"[..]);
    }

    #[test]
    fn decode_rejects_overrun_length() {
        assert!(Value::decode(b"10:short").is_err());
    }

    #[test]
    fn decode_rejects_unterminated_container() {
        assert!(Value::decode(b"l4:spam").is_err());
        assert!(Value::decode(b"d3:foo3:bar").is_err());
    }

    #[test]
    fn raw_value_is_copied_verbatim() {
        let mut dict = BTreeMap::new();
        dict.insert(b"info".to_vec(), Value::Raw(b"d4:name4:teste".to_vec()));
        dict.insert(b"announce".to_vec(), Value::str("http://x"));
        let encoded = Value::Dict(dict).encode();
        assert_eq!(encoded, b"d8:announce8:http://x4:infod4:name4:testee".to_vec());
    }
}
