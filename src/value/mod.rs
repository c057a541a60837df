//! Typed values and their PostgreSQL wire codecs.
//!
//! Every wire-representable type carries an explicit tri-state [`Status`]
//! alongside its native value: a value is undefined until assigned, and SQL
//! NULL is distinct from any native sentinel (an empty map is a present
//! value, not null). Concrete types implement the object-safe [`WireValue`]
//! codec contract plus typed `set`/`get`/`assign_to` accessors.

pub mod array;
pub mod bytes;
pub mod hstore;
pub mod primitives;
pub mod record;
pub mod registry;
pub mod text;

use std::any::Any;

use crate::error::Result;

pub use array::{
    Array, ArrayDimension, BoolArray, ByteaArray, Float4Array, Float8Array, Int2Array, Int4Array,
    Int8Array, TextArray, VarcharArray,
};
pub use bytes::Bytea;
pub use hstore::Hstore;
pub use primitives::{Bool, Float4, Float8, Int2, Int4, Int8};
pub use record::Record;
pub use registry::{DataType, TypeRegistry};
pub use text::{Text, Varchar};

/// Presence state of a value.
///
/// Carried explicitly next to the native value; never inferred from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Never assigned. Encoding an undefined value is an error.
    #[default]
    Undefined,
    /// The SQL NULL.
    Null,
    /// Holds a concrete native value.
    Present,
}

/// Result of `get()`: the native value, or the null/undefined marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tristate<T> {
    /// Never assigned
    Undefined,
    /// SQL NULL
    Null,
    /// The native value
    Present(T),
}

impl<T> Tristate<T> {
    /// Returns the native value if present.
    pub fn into_option(self) -> Option<T> {
        match self {
            Tristate::Present(value) => Some(value),
            _ => None,
        }
    }
}

/// Whether an encode call produced a value or the SQL NULL.
///
/// The caller owns the outer null-flag/length framing; a `Yes` means nothing
/// was written to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsNull {
    /// Value bytes were written
    No,
    /// Nothing was written; the field is NULL
    Yes,
}

/// Wire codec contract implemented by every value type.
///
/// The registry parameter lets composite types (record, array) resolve
/// per-field codecs and element oids at run time; scalar codecs ignore it.
pub trait WireValue: std::fmt::Debug {
    /// Current presence state.
    fn status(&self) -> Status;

    /// Decode from the binary wire format.
    ///
    /// `None` means the SQL value is NULL. Implementations must not retain a
    /// reference to `src`; they copy what they keep. Any length field that
    /// would read past the end of `src` is a decode error, never a panic.
    fn decode_binary(&mut self, registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()>;

    /// Decode from the text wire format. Same contract as [`Self::decode_binary`].
    fn decode_text(&mut self, registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()>;

    /// Encode into the binary wire format.
    ///
    /// Undefined status is an encode error. Null writes nothing and reports
    /// [`IsNull::Yes`]. The caller writes the outer null-flag/length framing.
    fn encode_binary(&self, registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull>;

    /// Encode into the text wire format. Same contract as [`Self::encode_binary`].
    fn encode_text(&self, registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull>;

    /// Downcast support for registry-constructed boxed values.
    fn as_any(&self) -> &dyn Any;
}

/// Encode error for a value that was never assigned.
pub(crate) fn encode_undefined(type_name: &str) -> crate::error::Error {
    crate::error::Error::Encode(format!("cannot encode {type_name} with undefined status"))
}
