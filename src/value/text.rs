//! The `text` type and the `varchar` type that delegates to it.

use crate::error::{Error, Result};
use crate::value::registry::TypeRegistry;
use crate::value::{IsNull, Status, Tristate, WireValue, encode_undefined};

/// The `text` type. Both wire formats are the raw utf-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Text {
    /// Native value, meaningful only when status is present
    pub value: String,
    /// Presence state
    pub status: Status,
}

impl Text {
    /// A present value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status: Status::Present,
        }
    }

    /// The SQL NULL.
    pub fn null() -> Self {
        Self {
            value: String::new(),
            status: Status::Null,
        }
    }

    /// Assign an owned or borrowed string.
    pub fn set(&mut self, src: impl Into<String>) {
        self.value = src.into();
        self.status = Status::Present;
    }

    /// The native value, or the null/undefined marker.
    pub fn get(&self) -> Tristate<&str> {
        match self.status {
            Status::Undefined => Tristate::Undefined,
            Status::Null => Tristate::Null,
            Status::Present => Tristate::Present(&self.value),
        }
    }

    /// Copy the native value into `dst`. Null and undefined are conversion
    /// errors.
    pub fn assign_to(&self, dst: &mut String) -> Result<()> {
        match self.status {
            Status::Present => {
                dst.clear();
                dst.push_str(&self.value);
                Ok(())
            }
            Status::Null => Err(Error::Conversion(
                "cannot assign null text to a non-optional target".into(),
            )),
            Status::Undefined => Err(Error::Conversion("cannot assign undefined text".into())),
        }
    }

    fn decode(&mut self, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };
        let text = simdutf8::basic::from_utf8(src)
            .map_err(|_| Error::Decode("text payload is not utf-8".into()))?;
        // Copies out of the frame; the buffer is reused for the next message.
        *self = Self::new(text);
        Ok(())
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("text")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                buf.extend_from_slice(self.value.as_bytes());
                Ok(IsNull::No)
            }
        }
    }
}

impl WireValue for Text {
    fn status(&self) -> Status {
        self.status
    }

    fn decode_binary(&mut self, _registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        self.decode(src)
    }

    fn decode_text(&mut self, _registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        self.decode(src)
    }

    fn encode_binary(&self, _registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        self.encode(buf)
    }

    fn encode_text(&self, _registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        self.encode(buf)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// The `varchar` type. Wire representation is identical to `text`; the
/// distinct type exists so the registry can resolve the `varchar` oid.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Varchar(pub Text);

impl Varchar {
    /// A present value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Text::new(value))
    }

    /// The SQL NULL.
    pub fn null() -> Self {
        Self(Text::null())
    }

    /// Assign an owned or borrowed string.
    pub fn set(&mut self, src: impl Into<String>) {
        self.0.set(src);
    }

    /// The native value, or the null/undefined marker.
    pub fn get(&self) -> Tristate<&str> {
        self.0.get()
    }

    /// Copy the native value into `dst`. Null and undefined are conversion
    /// errors.
    pub fn assign_to(&self, dst: &mut String) -> Result<()> {
        self.0.assign_to(dst)
    }
}

impl WireValue for Varchar {
    fn status(&self) -> Status {
        self.0.status
    }

    fn decode_binary(&mut self, registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        self.0.decode_binary(registry, src)
    }

    fn decode_text(&mut self, registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        self.0.decode_text(registry, src)
    }

    fn encode_binary(&self, registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        self.0.encode_binary(registry, buf)
    }

    fn encode_text(&self, registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        self.0.encode_text(registry, buf)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
