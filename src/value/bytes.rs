//! The `bytea` type.

use crate::error::{Error, Result};
use crate::value::registry::TypeRegistry;
use crate::value::{IsNull, Status, Tristate, WireValue, encode_undefined};

/// The `bytea` type. Binary format is the raw bytes; text format is the
/// `\x`-prefixed hex encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytea {
    /// Native value, meaningful only when status is present
    pub value: Vec<u8>,
    /// Presence state
    pub status: Status,
}

impl Bytea {
    /// A present value.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            status: Status::Present,
        }
    }

    /// The SQL NULL.
    pub fn null() -> Self {
        Self {
            value: Vec::new(),
            status: Status::Null,
        }
    }

    /// Assign an owned or borrowed byte string.
    pub fn set(&mut self, src: impl Into<Vec<u8>>) {
        self.value = src.into();
        self.status = Status::Present;
    }

    /// The native value, or the null/undefined marker.
    pub fn get(&self) -> Tristate<&[u8]> {
        match self.status {
            Status::Undefined => Tristate::Undefined,
            Status::Null => Tristate::Null,
            Status::Present => Tristate::Present(&self.value),
        }
    }

    /// Copy the native value into `dst`. Null and undefined are conversion
    /// errors.
    pub fn assign_to(&self, dst: &mut Vec<u8>) -> Result<()> {
        match self.status {
            Status::Present => {
                dst.clear();
                dst.extend_from_slice(&self.value);
                Ok(())
            }
            Status::Null => Err(Error::Conversion(
                "cannot assign null bytea to a non-optional target".into(),
            )),
            Status::Undefined => Err(Error::Conversion("cannot assign undefined bytea".into())),
        }
    }
}

impl WireValue for Bytea {
    fn status(&self) -> Status {
        self.status
    }

    fn decode_binary(&mut self, _registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };
        *self = Self::new(src);
        Ok(())
    }

    fn decode_text(&mut self, _registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };
        let hex = src.strip_prefix(b"\\x").ok_or_else(|| {
            Error::Decode("bytea literal does not start with \\x".into())
        })?;
        *self = Self::new(decode_hex(hex)?);
        Ok(())
    }

    fn encode_binary(&self, _registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("bytea")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                buf.extend_from_slice(&self.value);
                Ok(IsNull::No)
            }
        }
    }

    fn encode_text(&self, _registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("bytea")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                buf.extend_from_slice(b"\\x");
                for byte in &self.value {
                    buf.push(HEX_DIGITS[usize::from(byte >> 4)]);
                    buf.push(HEX_DIGITS[usize::from(byte & 0x0f)]);
                }
                Ok(IsNull::No)
            }
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(Error::Decode("bytea hex literal has odd length".into()));
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks_exact(2) {
        let high = hex_digit(pair[0])?;
        let low = hex_digit(pair[1])?;
        out.push((high << 4) | low);
    }
    Ok(out)
}

fn hex_digit(byte: u8) -> Result<u8> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(Error::Decode(format!(
            "invalid hex digit {:?} in bytea literal",
            char::from(byte)
        ))),
    }
}
