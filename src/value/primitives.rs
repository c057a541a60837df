//! Fixed-width scalar types: bool, the integer family and the float family.
//!
//! Binary codecs are big-endian fixed width; a payload of any other width is
//! a decode error. Text codecs go through the canonical PostgreSQL literals.

use crate::error::{Error, Result};
use crate::value::registry::TypeRegistry;
use crate::value::{IsNull, Status, Tristate, WireValue, encode_undefined};

macro_rules! numeric_value {
    ($name:ident, $native:ty, $pgname:literal, $width:expr) => {
        #[doc = concat!("The `", $pgname, "` type.")]
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct $name {
            /// Native value, meaningful only when status is present
            pub value: $native,
            /// Presence state
            pub status: Status,
        }

        impl $name {
            /// A present value.
            pub fn new(value: $native) -> Self {
                Self {
                    value,
                    status: Status::Present,
                }
            }

            /// The SQL NULL.
            pub fn null() -> Self {
                Self {
                    value: <$native>::default(),
                    status: Status::Null,
                }
            }

            /// Assign from any native type convertible without loss.
            ///
            /// An out-of-range source is a conversion error and leaves the
            /// value unchanged.
            pub fn set<T>(&mut self, src: T) -> Result<()>
            where
                T: TryInto<$native>,
            {
                match src.try_into() {
                    Ok(value) => {
                        self.value = value;
                        self.status = Status::Present;
                        Ok(())
                    }
                    Err(_) => Err(Error::Conversion(format!(
                        "cannot convert {} value to {}",
                        std::any::type_name::<T>(),
                        $pgname,
                    ))),
                }
            }

            /// The native value, or the null/undefined marker.
            pub fn get(&self) -> Tristate<$native> {
                match self.status {
                    Status::Undefined => Tristate::Undefined,
                    Status::Null => Tristate::Null,
                    Status::Present => Tristate::Present(self.value),
                }
            }

            /// Copy the native value into `dst`. Null and undefined are
            /// conversion errors.
            pub fn assign_to(&self, dst: &mut $native) -> Result<()> {
                match self.status {
                    Status::Present => {
                        *dst = self.value;
                        Ok(())
                    }
                    Status::Null => Err(Error::Conversion(format!(
                        "cannot assign null {} to a non-optional target",
                        $pgname,
                    ))),
                    Status::Undefined => Err(Error::Conversion(format!(
                        "cannot assign undefined {}",
                        $pgname,
                    ))),
                }
            }
        }

        impl WireValue for $name {
            fn status(&self) -> Status {
                self.status
            }

            fn decode_binary(
                &mut self,
                _registry: &TypeRegistry,
                src: Option<&[u8]>,
            ) -> Result<()> {
                let Some(src) = src else {
                    *self = Self::null();
                    return Ok(());
                };
                let Ok(bytes) = <[u8; $width]>::try_from(src) else {
                    return Err(Error::Decode(format!(
                        "invalid {} payload length {}, expected {}",
                        $pgname,
                        src.len(),
                        $width,
                    )));
                };
                *self = Self::new(<$native>::from_be_bytes(bytes));
                Ok(())
            }

            fn decode_text(&mut self, _registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
                let Some(src) = src else {
                    *self = Self::null();
                    return Ok(());
                };
                let text = simdutf8::basic::from_utf8(src)
                    .map_err(|_| Error::Decode(format!("{} literal is not utf-8", $pgname)))?;
                let value = text.parse::<$native>().map_err(|e| {
                    Error::Decode(format!("invalid {} literal {text:?}: {e}", $pgname))
                })?;
                *self = Self::new(value);
                Ok(())
            }

            fn encode_binary(
                &self,
                _registry: &TypeRegistry,
                buf: &mut Vec<u8>,
            ) -> Result<IsNull> {
                match self.status {
                    Status::Undefined => Err(encode_undefined($pgname)),
                    Status::Null => Ok(IsNull::Yes),
                    Status::Present => {
                        buf.extend_from_slice(&self.value.to_be_bytes());
                        Ok(IsNull::No)
                    }
                }
            }

            fn encode_text(&self, _registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
                match self.status {
                    Status::Undefined => Err(encode_undefined($pgname)),
                    Status::Null => Ok(IsNull::Yes),
                    Status::Present => {
                        buf.extend_from_slice(self.value.to_string().as_bytes());
                        Ok(IsNull::No)
                    }
                }
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

numeric_value!(Int2, i16, "int2", 2);
numeric_value!(Int4, i32, "int4", 4);
numeric_value!(Int8, i64, "int8", 8);
numeric_value!(Float4, f32, "float4", 4);
numeric_value!(Float8, f64, "float8", 8);

/// The `bool` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bool {
    /// Native value, meaningful only when status is present
    pub value: bool,
    /// Presence state
    pub status: Status,
}

impl Bool {
    /// A present value.
    pub fn new(value: bool) -> Self {
        Self {
            value,
            status: Status::Present,
        }
    }

    /// The SQL NULL.
    pub fn null() -> Self {
        Self {
            value: false,
            status: Status::Null,
        }
    }

    /// Assign a native bool.
    pub fn set(&mut self, src: bool) {
        self.value = src;
        self.status = Status::Present;
    }

    /// The native value, or the null/undefined marker.
    pub fn get(&self) -> Tristate<bool> {
        match self.status {
            Status::Undefined => Tristate::Undefined,
            Status::Null => Tristate::Null,
            Status::Present => Tristate::Present(self.value),
        }
    }

    /// Copy the native value into `dst`. Null and undefined are conversion
    /// errors.
    pub fn assign_to(&self, dst: &mut bool) -> Result<()> {
        match self.status {
            Status::Present => {
                *dst = self.value;
                Ok(())
            }
            Status::Null => Err(Error::Conversion(
                "cannot assign null bool to a non-optional target".into(),
            )),
            Status::Undefined => Err(Error::Conversion("cannot assign undefined bool".into())),
        }
    }
}

impl WireValue for Bool {
    fn status(&self) -> Status {
        self.status
    }

    fn decode_binary(&mut self, _registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };
        match src {
            [0] => *self = Self::new(false),
            [1] => *self = Self::new(true),
            _ => {
                return Err(Error::Decode(format!(
                    "invalid bool payload: {src:02x?}"
                )));
            }
        }
        Ok(())
    }

    fn decode_text(&mut self, _registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };
        match src {
            b"t" | b"T" | b"true" | b"TRUE" | b"1" => *self = Self::new(true),
            b"f" | b"F" | b"false" | b"FALSE" | b"0" => *self = Self::new(false),
            _ => {
                return Err(Error::Decode(format!(
                    "invalid bool literal: {:?}",
                    String::from_utf8_lossy(src)
                )));
            }
        }
        Ok(())
    }

    fn encode_binary(&self, _registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("bool")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                buf.push(u8::from(self.value));
                Ok(IsNull::No)
            }
        }
    }

    fn encode_text(&self, _registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("bool")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                buf.push(if self.value { b't' } else { b'f' });
                Ok(IsNull::No)
            }
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new()
    }

    #[test]
    fn default_is_undefined() {
        let value = Int4::default();
        assert_eq!(value.status, Status::Undefined);
        assert_eq!(value.get(), Tristate::Undefined);
    }

    #[test]
    fn undefined_encode_is_error() {
        let registry = registry();
        let mut buf = Vec::new();
        assert!(Int4::default().encode_binary(&registry, &mut buf).is_err());
        assert!(Int4::default().encode_text(&registry, &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn int4_binary_round() {
        let registry = registry();
        let mut buf = Vec::new();
        assert_eq!(
            Int4::new(-7).encode_binary(&registry, &mut buf).unwrap(),
            IsNull::No
        );
        assert_eq!(buf, (-7_i32).to_be_bytes());

        let mut decoded = Int4::default();
        decoded.decode_binary(&registry, Some(&buf)).unwrap();
        assert_eq!(decoded.get(), Tristate::Present(-7));
    }

    #[test]
    fn int4_binary_wrong_width() {
        let registry = registry();
        let mut value = Int4::default();
        let err = value.decode_binary(&registry, Some(&[0, 1])).unwrap_err();
        assert!(err.to_string().contains("int4"));
    }

    #[test]
    fn int2_set_rejects_overflow() {
        let mut value = Int2::default();
        assert!(value.set(70000_i32).is_err());
        assert_eq!(value.status, Status::Undefined);

        value.set(17_i32).unwrap();
        assert_eq!(value.get(), Tristate::Present(17));
    }

    #[test]
    fn null_decode_and_encode() {
        let registry = registry();
        let mut value = Int8::new(42);
        value.decode_binary(&registry, None).unwrap();
        assert_eq!(value.get(), Tristate::Null);

        let mut buf = Vec::new();
        assert_eq!(value.encode_binary(&registry, &mut buf).unwrap(), IsNull::Yes);
        assert!(buf.is_empty());
    }

    #[test]
    fn float8_text_round() {
        let registry = registry();
        let mut buf = Vec::new();
        Float8::new(1.5).encode_text(&registry, &mut buf).unwrap();
        assert_eq!(buf, b"1.5");

        let mut decoded = Float8::default();
        decoded.decode_text(&registry, Some(b"-2.25")).unwrap();
        assert_eq!(decoded.get(), Tristate::Present(-2.25));
    }

    #[test]
    fn bool_codecs() {
        let registry = registry();
        let mut value = Bool::default();
        for literal in [&b"t"[..], b"T", b"true", b"TRUE", b"1"] {
            value.decode_text(&registry, Some(literal)).unwrap();
            assert_eq!(value.get(), Tristate::Present(true), "{literal:?}");
        }
        for literal in [&b"f"[..], b"F", b"false", b"FALSE", b"0"] {
            value.decode_text(&registry, Some(literal)).unwrap();
            assert_eq!(value.get(), Tristate::Present(false), "{literal:?}");
        }

        value.decode_binary(&registry, Some(&[0])).unwrap();
        assert_eq!(value.get(), Tristate::Present(false));

        assert!(value.decode_binary(&registry, Some(&[2])).is_err());
        assert!(value.decode_text(&registry, Some(b"yes")).is_err());
        assert!(value.decode_text(&registry, Some(b"True")).is_err());

        let mut buf = Vec::new();
        Bool::new(true).encode_text(&registry, &mut buf).unwrap();
        assert_eq!(buf, b"t");
    }

    #[test]
    fn assign_to_null_is_error() {
        let mut dst = 0_i32;
        assert!(Int4::null().assign_to(&mut dst).is_err());
        Int4::new(9).assign_to(&mut dst).unwrap();
        assert_eq!(dst, 9);
    }
}
