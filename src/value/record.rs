//! The `record` (anonymous composite) type.

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_i32, read_u32};
use crate::value::registry::TypeRegistry;
use crate::value::{IsNull, Status, Tristate, WireValue, encode_undefined};

/// The `record` type: a heterogeneous field list decoded through
/// registry-resolved codecs.
///
/// The text format is unsupported in both directions; records only travel in
/// binary.
#[derive(Debug, Default)]
pub struct Record {
    /// Decoded field values, meaningful only when status is present
    pub fields: Vec<Box<dyn WireValue>>,
    /// Presence state
    pub status: Status,
}

impl Record {
    /// A present value.
    pub fn new(fields: Vec<Box<dyn WireValue>>) -> Self {
        Self {
            fields,
            status: Status::Present,
        }
    }

    /// The SQL NULL.
    pub fn null() -> Self {
        Self {
            fields: Vec::new(),
            status: Status::Null,
        }
    }

    /// Assign a field list.
    pub fn set(&mut self, fields: Vec<Box<dyn WireValue>>) {
        *self = Self::new(fields);
    }

    /// The field list, or the null/undefined marker.
    pub fn get(&self) -> Tristate<&[Box<dyn WireValue>]> {
        match self.status {
            Status::Undefined => Tristate::Undefined,
            Status::Null => Tristate::Null,
            Status::Present => Tristate::Present(&self.fields),
        }
    }

    /// A single field, if present and in range. Callers downcast through
    /// [`WireValue::as_any`].
    pub fn field(&self, index: usize) -> Option<&dyn WireValue> {
        match self.status {
            Status::Present => self.fields.get(index).map(Box::as_ref),
            _ => None,
        }
    }

    /// Take ownership of the field list. Null and undefined are conversion
    /// errors; boxed fields cannot be cloned, so this is the move-based
    /// analogue of `assign_to`.
    pub fn into_fields(self) -> Result<Vec<Box<dyn WireValue>>> {
        match self.status {
            Status::Present => Ok(self.fields),
            Status::Null => Err(Error::Conversion(
                "cannot assign null record to a non-optional target".into(),
            )),
            Status::Undefined => Err(Error::Conversion("cannot assign undefined record".into())),
        }
    }
}

impl WireValue for Record {
    fn status(&self) -> Status {
        self.status
    }

    fn decode_binary(&mut self, registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };
        let (field_count, mut rest) = read_i32(src)?;
        let Ok(field_count) = usize::try_from(field_count) else {
            return Err(Error::Decode(format!(
                "record field count is negative: {field_count}"
            )));
        };

        // Each field needs at least its 8-byte header.
        let mut fields = Vec::with_capacity(field_count.min(rest.len() / 8));
        for index in 0..field_count {
            let (field_oid, after_oid) = read_u32(rest)?;
            let (field_len, after_len) = read_i32(after_oid)?;

            let mut value = registry.new_value_for_oid(field_oid).ok_or_else(|| {
                Error::Decode(format!(
                    "record field {index}: no codec registered for oid {field_oid}"
                ))
            })?;

            rest = if field_len < 0 {
                value.decode_binary(registry, None)?;
                after_len
            } else {
                #[allow(clippy::cast_sign_loss)]
                let (field_bytes, after_field) = read_bytes(after_len, field_len as usize)?;
                value.decode_binary(registry, Some(field_bytes))?;
                after_field
            };
            fields.push(value);
        }

        *self = Self::new(fields);
        Ok(())
    }

    fn decode_text(&mut self, _registry: &TypeRegistry, _src: Option<&[u8]>) -> Result<()> {
        Err(Error::Unsupported(
            "record does not support the text format".into(),
        ))
    }

    fn encode_binary(&self, registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("record")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                let field_count = i32::try_from(self.fields.len())
                    .map_err(|_| Error::Encode("record has too many fields".into()))?;
                buf.extend_from_slice(&field_count.to_be_bytes());

                let mut field_buf = Vec::new();
                for (index, field) in self.fields.iter().enumerate() {
                    let field_oid = registry
                        .by_type_id(field.as_any().type_id())
                        .map(super::registry::DataType::oid)
                        .ok_or_else(|| {
                            Error::Encode(format!(
                                "record field {index}: type is not registered, cannot resolve oid"
                            ))
                        })?;
                    buf.extend_from_slice(&field_oid.to_be_bytes());

                    field_buf.clear();
                    match field.encode_binary(registry, &mut field_buf)? {
                        IsNull::Yes => buf.extend_from_slice(&(-1_i32).to_be_bytes()),
                        IsNull::No => {
                            let field_len = i32::try_from(field_buf.len()).map_err(|_| {
                                Error::Encode(format!("record field {index} is too long"))
                            })?;
                            buf.extend_from_slice(&field_len.to_be_bytes());
                            buf.extend_from_slice(&field_buf);
                        }
                    }
                }
                Ok(IsNull::No)
            }
        }
    }

    fn encode_text(&self, _registry: &TypeRegistry, _buf: &mut Vec<u8>) -> Result<IsNull> {
        Err(Error::Unsupported(
            "record does not support the text format".into(),
        ))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;
    use crate::value::primitives::{Bool, Int4};
    use crate::value::text::Text;

    fn encode_field(buf: &mut Vec<u8>, field_oid: u32, payload: Option<&[u8]>) {
        buf.extend_from_slice(&field_oid.to_be_bytes());
        match payload {
            Some(payload) => {
                #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
                buf.extend_from_slice(payload);
            }
            None => buf.extend_from_slice(&(-1_i32).to_be_bytes()),
        }
    }

    #[test]
    fn decodes_mixed_fields() {
        let registry = TypeRegistry::with_defaults();

        let mut payload = Vec::new();
        payload.extend_from_slice(&3_i32.to_be_bytes());
        encode_field(&mut payload, oid::INT4, Some(&7_i32.to_be_bytes()));
        encode_field(&mut payload, oid::TEXT, Some(b"seven"));
        encode_field(&mut payload, oid::BOOL, None);

        let mut record = Record::default();
        record.decode_binary(&registry, Some(&payload)).unwrap();

        let fields = record.get().into_option().unwrap();
        assert_eq!(fields.len(), 3);

        let int4 = fields[0].as_any().downcast_ref::<Int4>().unwrap();
        assert_eq!(int4.get(), Tristate::Present(7));

        let text = fields[1].as_any().downcast_ref::<Text>().unwrap();
        assert_eq!(text.get(), Tristate::Present("seven"));

        let bool_field = fields[2].as_any().downcast_ref::<Bool>().unwrap();
        assert_eq!(bool_field.get(), Tristate::Null);
    }

    #[test]
    fn unknown_field_oid_names_the_oid() {
        let registry = TypeRegistry::with_defaults();

        let mut payload = Vec::new();
        payload.extend_from_slice(&1_i32.to_be_bytes());
        encode_field(&mut payload, 999_999, Some(b"x"));

        let mut record = Record::default();
        let err = record.decode_binary(&registry, Some(&payload)).unwrap_err();
        assert!(err.to_string().contains("999999"));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let registry = TypeRegistry::with_defaults();

        let mut payload = Vec::new();
        payload.extend_from_slice(&1_i32.to_be_bytes());
        encode_field(&mut payload, oid::INT4, Some(&7_i32.to_be_bytes()));

        let mut record = Record::default();
        for cut in [2, 6, payload.len() - 1] {
            assert!(
                record
                    .decode_binary(&registry, Some(&payload[..cut]))
                    .is_err()
            );
        }
    }

    #[test]
    fn binary_round() {
        let registry = TypeRegistry::with_defaults();
        let record = Record::new(vec![
            Box::new(Int4::new(42)),
            Box::new(Text::null()),
        ]);

        let mut buf = Vec::new();
        assert_eq!(record.encode_binary(&registry, &mut buf).unwrap(), IsNull::No);

        let mut decoded = Record::default();
        decoded.decode_binary(&registry, Some(&buf)).unwrap();
        let fields = decoded.into_fields().unwrap();
        assert_eq!(
            fields[0].as_any().downcast_ref::<Int4>().unwrap().get(),
            Tristate::Present(42)
        );
        assert_eq!(fields[1].status(), Status::Null);
    }

    #[test]
    fn text_format_is_unsupported() {
        let registry = TypeRegistry::with_defaults();
        let mut record = Record::default();
        assert!(matches!(
            record.decode_text(&registry, Some(b"(1,2)")),
            Err(Error::Unsupported(_))
        ));

        let mut buf = Vec::new();
        assert!(matches!(
            Record::new(Vec::new()).encode_text(&registry, &mut buf),
            Err(Error::Unsupported(_))
        ));
    }
}
