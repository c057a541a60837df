//! The `hstore` extension type: a string-keyed map with nullable values.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_i32};
use crate::value::registry::TypeRegistry;
use crate::value::text::Text;
use crate::value::{IsNull, Status, Tristate, WireValue, encode_undefined};

/// The `hstore` type.
///
/// Values are stored as [`Text`] so each one carries its own null state; an
/// empty present map is distinct from the SQL NULL.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hstore {
    /// Native value, meaningful only when status is present
    pub map: HashMap<String, Text>,
    /// Presence state
    pub status: Status,
}

impl Hstore {
    /// A present value.
    pub fn new(map: HashMap<String, Text>) -> Self {
        Self {
            map,
            status: Status::Present,
        }
    }

    /// The SQL NULL.
    pub fn null() -> Self {
        Self {
            map: HashMap::new(),
            status: Status::Null,
        }
    }

    /// Assign from a map shape convertible to hstore.
    pub fn set(&mut self, src: impl Into<Hstore>) {
        *self = src.into();
    }

    /// The native map, or the null/undefined marker.
    pub fn get(&self) -> Tristate<&HashMap<String, Text>> {
        match self.status {
            Status::Undefined => Tristate::Undefined,
            Status::Null => Tristate::Null,
            Status::Present => Tristate::Present(&self.map),
        }
    }

    /// Copy into a flat string map. Null map values and a null or undefined
    /// hstore are conversion errors.
    pub fn assign_to(&self, dst: &mut HashMap<String, String>) -> Result<()> {
        match self.status {
            Status::Present => {
                dst.clear();
                for (key, value) in &self.map {
                    match value.get() {
                        Tristate::Present(text) => {
                            dst.insert(key.clone(), text.to_owned());
                        }
                        _ => {
                            return Err(Error::Conversion(format!(
                                "hstore key {key:?} has a null value, target map is non-nullable"
                            )));
                        }
                    }
                }
                Ok(())
            }
            Status::Null => Err(Error::Conversion(
                "cannot assign null hstore to a non-optional target".into(),
            )),
            Status::Undefined => Err(Error::Conversion("cannot assign undefined hstore".into())),
        }
    }

    /// Copy into a map with nullable values. Null and undefined hstores are
    /// conversion errors.
    pub fn assign_to_nullable(&self, dst: &mut HashMap<String, Option<String>>) -> Result<()> {
        match self.status {
            Status::Present => {
                dst.clear();
                for (key, value) in &self.map {
                    dst.insert(key.clone(), value.get().into_option().map(str::to_owned));
                }
                Ok(())
            }
            Status::Null => Err(Error::Conversion(
                "cannot assign null hstore to a non-optional target".into(),
            )),
            Status::Undefined => Err(Error::Conversion("cannot assign undefined hstore".into())),
        }
    }
}

impl From<HashMap<String, String>> for Hstore {
    fn from(src: HashMap<String, String>) -> Self {
        Self::new(
            src.into_iter()
                .map(|(key, value)| (key, Text::new(value)))
                .collect(),
        )
    }
}

impl From<HashMap<String, Option<String>>> for Hstore {
    fn from(src: HashMap<String, Option<String>>) -> Self {
        Self::new(
            src.into_iter()
                .map(|(key, value)| {
                    let text = match value {
                        Some(value) => Text::new(value),
                        None => Text::null(),
                    };
                    (key, text)
                })
                .collect(),
        )
    }
}

impl WireValue for Hstore {
    fn status(&self) -> Status {
        self.status
    }

    fn decode_binary(&mut self, registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };
        let (pair_count, mut rest) = read_i32(src)?;
        let Ok(pair_count) = usize::try_from(pair_count) else {
            return Err(Error::Decode(format!(
                "hstore pair count is negative: {pair_count}"
            )));
        };

        let mut map = HashMap::with_capacity(pair_count.min(rest.len() / 8));
        for _ in 0..pair_count {
            let (key_len, after_len) = read_i32(rest)?;
            let Ok(key_len) = usize::try_from(key_len) else {
                return Err(Error::Decode("hstore key length is negative".into()));
            };
            let (key_bytes, after_key) = read_bytes(after_len, key_len)?;
            let key = simdutf8::basic::from_utf8(key_bytes)
                .map_err(|_| Error::Decode("hstore key is not utf-8".into()))?
                .to_owned();

            let (value_len, after_len) = read_i32(after_key)?;
            let mut value = Text::default();
            rest = if value_len < 0 {
                value.decode_text(registry, None)?;
                after_len
            } else {
                #[allow(clippy::cast_sign_loss)]
                let (value_bytes, after_value) = read_bytes(after_len, value_len as usize)?;
                value.decode_text(registry, Some(value_bytes))?;
                after_value
            };
            map.insert(key, value);
        }

        *self = Self::new(map);
        Ok(())
    }

    fn decode_text(&mut self, _registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };
        let text = simdutf8::basic::from_utf8(src)
            .map_err(|_| Error::Decode("hstore literal is not utf-8".into()))?;
        *self = Self::new(parse_literal(text)?);
        Ok(())
    }

    fn encode_binary(&self, registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("hstore")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                let pair_count = i32::try_from(self.map.len())
                    .map_err(|_| Error::Encode("hstore has too many pairs".into()))?;
                buf.extend_from_slice(&pair_count.to_be_bytes());

                let mut value_buf = Vec::new();
                for (key, value) in &self.map {
                    let key_len = i32::try_from(key.len())
                        .map_err(|_| Error::Encode(format!("hstore key {key:?} is too long")))?;
                    buf.extend_from_slice(&key_len.to_be_bytes());
                    buf.extend_from_slice(key.as_bytes());

                    value_buf.clear();
                    match value.encode_text(registry, &mut value_buf)? {
                        IsNull::Yes => buf.extend_from_slice(&(-1_i32).to_be_bytes()),
                        IsNull::No => {
                            let value_len = i32::try_from(value_buf.len()).map_err(|_| {
                                Error::Encode(format!("hstore value for {key:?} is too long"))
                            })?;
                            buf.extend_from_slice(&value_len.to_be_bytes());
                            buf.extend_from_slice(&value_buf);
                        }
                    }
                }
                Ok(IsNull::No)
            }
        }
    }

    fn encode_text(&self, _registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("hstore")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                let mut first = true;
                for (key, value) in &self.map {
                    if !first {
                        buf.extend_from_slice(b", ");
                    }
                    first = false;
                    write_quoted(buf, key);
                    buf.extend_from_slice(b"=>");
                    match value.get() {
                        Tristate::Present(text) => write_quoted(buf, text),
                        _ => buf.extend_from_slice(b"NULL"),
                    }
                }
                Ok(IsNull::No)
            }
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn write_quoted(buf: &mut Vec<u8>, text: &str) {
    buf.push(b'"');
    for byte in text.bytes() {
        if byte == b'"' || byte == b'\\' {
            buf.push(b'\\');
        }
        buf.push(byte);
    }
    buf.push(b'"');
}

/// Parse the `"key"=>"value", "k2"=>NULL` literal produced by the server's
/// text output.
fn parse_literal(text: &str) -> Result<HashMap<String, Text>> {
    let mut map = HashMap::new();
    let mut chars = text.chars().peekable();

    loop {
        skip_spaces(&mut chars);
        if chars.peek().is_none() {
            return Ok(map);
        }

        let key = parse_quoted(&mut chars)?;

        skip_spaces(&mut chars);
        if !(chars.next() == Some('=') && chars.next() == Some('>')) {
            return Err(Error::Decode(format!(
                "hstore literal: expected => after key {key:?}"
            )));
        }
        skip_spaces(&mut chars);

        let value = match chars.peek() {
            Some('"') => {
                let text = parse_quoted(&mut chars)?;
                Text::new(text)
            }
            Some('N' | 'n') => {
                for expected in ['n', 'u', 'l', 'l'] {
                    match chars.next() {
                        Some(c) if c.eq_ignore_ascii_case(&expected) => {}
                        _ => {
                            return Err(Error::Decode("hstore literal: malformed NULL".into()));
                        }
                    }
                }
                Text::null()
            }
            _ => {
                return Err(Error::Decode(format!(
                    "hstore literal: malformed value for key {key:?}"
                )));
            }
        };
        map.insert(key, value);

        skip_spaces(&mut chars);
        match chars.next() {
            Some(',') => {}
            None => return Ok(map),
            Some(other) => {
                return Err(Error::Decode(format!(
                    "hstore literal: unexpected character {other:?}"
                )));
            }
        }
    }
}

fn skip_spaces(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace()) {
        chars.next();
    }
}

fn parse_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String> {
    if chars.next() != Some('"') {
        return Err(Error::Decode("hstore literal: expected opening quote".into()));
    }
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(out),
            Some('\\') => match chars.next() {
                Some(escaped @ ('"' | '\\')) => out.push(escaped),
                _ => {
                    return Err(Error::Decode(
                        "hstore literal: invalid escape sequence".into(),
                    ));
                }
            },
            Some(c) => out.push(c),
            None => {
                return Err(Error::Decode(
                    "hstore literal: unterminated quoted string".into(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Hstore {
        let mut map = HashMap::new();
        map.insert("city".to_owned(), Text::new("oslo"));
        map.insert("region".to_owned(), Text::null());
        Hstore::new(map)
    }

    #[test]
    fn binary_round() {
        let registry = TypeRegistry::new();
        let mut buf = Vec::new();
        assert_eq!(
            sample().encode_binary(&registry, &mut buf).unwrap(),
            IsNull::No
        );

        let mut decoded = Hstore::default();
        decoded.decode_binary(&registry, Some(&buf)).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn binary_layout() {
        let registry = TypeRegistry::new();
        let mut map = HashMap::new();
        map.insert("k".to_owned(), Text::null());
        let mut buf = Vec::new();
        Hstore::new(map).encode_binary(&registry, &mut buf).unwrap();

        // pair count 1, key length 1, "k", value length -1
        assert_eq!(buf, b"\x00\x00\x00\x01\x00\x00\x00\x01k\xff\xff\xff\xff");
    }

    #[test]
    fn binary_rejects_truncation() {
        let registry = TypeRegistry::new();
        let mut buf = Vec::new();
        sample().encode_binary(&registry, &mut buf).unwrap();

        let mut decoded = Hstore::default();
        for cut in [0, 3, 7, buf.len() - 1] {
            assert!(decoded.decode_binary(&registry, Some(&buf[..cut])).is_err());
        }
    }

    #[test]
    fn binary_rejects_negative_pair_count() {
        let registry = TypeRegistry::new();
        let mut decoded = Hstore::default();
        let err = decoded
            .decode_binary(&registry, Some(&(-1_i32).to_be_bytes()))
            .unwrap_err();
        assert!(err.to_string().contains("pair count"));
    }

    #[test]
    fn empty_map_is_present() {
        let registry = TypeRegistry::new();
        let mut decoded = Hstore::default();
        decoded
            .decode_binary(&registry, Some(&0_i32.to_be_bytes()))
            .unwrap();
        assert_eq!(decoded.status, Status::Present);
        assert!(decoded.map.is_empty());

        decoded.decode_binary(&registry, None).unwrap();
        assert_eq!(decoded.status, Status::Null);
    }

    #[test]
    fn text_round() {
        let registry = TypeRegistry::new();
        let mut buf = Vec::new();
        sample().encode_text(&registry, &mut buf).unwrap();

        let mut decoded = Hstore::default();
        decoded.decode_text(&registry, Some(&buf)).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn text_parses_escapes_and_null() {
        let registry = TypeRegistry::new();
        let mut decoded = Hstore::default();
        decoded
            .decode_text(
                &registry,
                Some(br#""a\"b"=>"c\\d", "e"=>NULL"#),
            )
            .unwrap();
        assert_eq!(decoded.map.len(), 2);
        assert_eq!(decoded.map["a\"b"], Text::new("c\\d"));
        assert_eq!(decoded.map["e"], Text::null());
    }

    #[test]
    fn text_rejects_malformed() {
        let registry = TypeRegistry::new();
        let mut decoded = Hstore::default();
        assert!(decoded.decode_text(&registry, Some(b"\"a\"=\"b\"")).is_err());
        assert!(decoded.decode_text(&registry, Some(b"\"a\"=>")).is_err());
        assert!(decoded.decode_text(&registry, Some(b"\"a")).is_err());
    }

    #[test]
    fn assign_to_flat_rejects_null_values() {
        let mut dst = HashMap::new();
        assert!(sample().assign_to(&mut dst).is_err());

        let mut nullable = HashMap::new();
        sample().assign_to_nullable(&mut nullable).unwrap();
        assert_eq!(nullable["city"], Some("oslo".to_owned()));
        assert_eq!(nullable["region"], None);
    }

    #[test]
    fn set_from_native_maps() {
        let mut value = Hstore::default();
        let mut src = HashMap::new();
        src.insert("k".to_owned(), "v".to_owned());
        value.set(src);
        assert_eq!(value.map["k"], Text::new("v"));

        let mut nullable = HashMap::new();
        nullable.insert("n".to_owned(), None::<String>);
        value.set(nullable);
        assert_eq!(value.map["n"], Text::null());
    }
}
