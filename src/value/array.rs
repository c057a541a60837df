//! Generic array codec over any registered element type.

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_i32, read_u32};
use crate::value::registry::TypeRegistry;
use crate::value::{IsNull, Status, Tristate, WireValue, encode_undefined};

/// Server-side limit on array dimensionality (MAXDIM).
const MAX_DIMENSIONS: usize = 6;

/// One array dimension: element count and lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDimension {
    /// Number of elements along this dimension
    pub len: i32,
    /// Index of the first element (SQL arrays default to 1)
    pub lower_bound: i32,
}

/// A PostgreSQL array of `T`.
///
/// Elements are stored flattened in row-major order with the dimension list
/// alongside. Only the binary format is implemented; the text array literal
/// is unsupported in both directions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array<T> {
    /// Flattened elements, meaningful only when status is present
    pub elements: Vec<T>,
    /// Dimension list; empty for an empty array
    pub dimensions: Vec<ArrayDimension>,
    /// Presence state
    pub status: Status,
}

impl<T> Array<T> {
    /// A present one-dimensional array.
    pub fn new(elements: Vec<T>) -> Self {
        let dimensions = if elements.is_empty() {
            Vec::new()
        } else {
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            vec![ArrayDimension {
                len: elements.len() as i32,
                lower_bound: 1,
            }]
        };
        Self {
            elements,
            dimensions,
            status: Status::Present,
        }
    }

    /// The SQL NULL.
    pub fn null() -> Self {
        Self {
            elements: Vec::new(),
            dimensions: Vec::new(),
            status: Status::Null,
        }
    }

    /// Assign a one-dimensional element list.
    pub fn set(&mut self, elements: Vec<T>) {
        *self = Self::new(elements);
    }

    /// The flattened elements, or the null/undefined marker.
    pub fn get(&self) -> Tristate<&[T]> {
        match self.status {
            Status::Undefined => Tristate::Undefined,
            Status::Null => Tristate::Null,
            Status::Present => Tristate::Present(&self.elements),
        }
    }

    fn expected_len(&self) -> Option<usize> {
        if self.dimensions.is_empty() {
            return Some(0);
        }
        self.dimensions
            .iter()
            .try_fold(1_usize, |product, dimension| {
                product.checked_mul(usize::try_from(dimension.len).ok()?)
            })
    }
}

impl<T> WireValue for Array<T>
where
    T: WireValue + Default + std::fmt::Debug + 'static,
{
    fn status(&self) -> Status {
        self.status
    }

    fn decode_binary(&mut self, registry: &TypeRegistry, src: Option<&[u8]>) -> Result<()> {
        let Some(src) = src else {
            *self = Self::null();
            return Ok(());
        };

        let (dimension_count, rest) = read_i32(src)?;
        let Ok(dimension_count) = usize::try_from(dimension_count) else {
            return Err(Error::Decode(format!(
                "array dimension count is negative: {dimension_count}"
            )));
        };
        if dimension_count > MAX_DIMENSIONS {
            return Err(Error::Decode(format!(
                "array has {dimension_count} dimensions, server maximum is {MAX_DIMENSIONS}"
            )));
        }

        // Null bitmap flag; ignored, element nulls are explicit -1 lengths.
        let (_flags, rest) = read_i32(rest)?;

        let (element_oid, mut rest) = read_u32(rest)?;
        if let Some(expected_oid) = registry.oid_of::<T>() {
            if element_oid != expected_oid {
                return Err(Error::Decode(format!(
                    "array element oid {element_oid} does not match expected oid {expected_oid}"
                )));
            }
        }

        let mut dimensions = Vec::with_capacity(dimension_count);
        let mut total = if dimension_count == 0 { 0 } else { 1_usize };
        for _ in 0..dimension_count {
            let (len, after_len) = read_i32(rest)?;
            let (lower_bound, after_bound) = read_i32(after_len)?;
            rest = after_bound;
            let Ok(len_usize) = usize::try_from(len) else {
                return Err(Error::Decode(format!(
                    "array dimension length is negative: {len}"
                )));
            };
            total = total.checked_mul(len_usize).ok_or_else(|| {
                Error::Decode("array element count overflows".into())
            })?;
            dimensions.push(ArrayDimension { len, lower_bound });
        }

        // Each element carries at least a 4-byte length header, so a total
        // beyond rest.len() / 4 cannot be satisfied by the payload.
        if total > rest.len() / 4 {
            return Err(Error::Decode(format!(
                "array claims {total} elements but only {} payload bytes remain",
                rest.len()
            )));
        }

        let mut elements = Vec::with_capacity(total);
        for _ in 0..total {
            let (element_len, after_len) = read_i32(rest)?;
            let mut element = T::default();
            rest = if element_len < 0 {
                element.decode_binary(registry, None)?;
                after_len
            } else {
                #[allow(clippy::cast_sign_loss)]
                let (element_bytes, after_element) = read_bytes(after_len, element_len as usize)?;
                element.decode_binary(registry, Some(element_bytes))?;
                after_element
            };
            elements.push(element);
        }

        *self = Self {
            elements,
            dimensions,
            status: Status::Present,
        };
        Ok(())
    }

    fn decode_text(&mut self, _registry: &TypeRegistry, _src: Option<&[u8]>) -> Result<()> {
        Err(Error::Unsupported(
            "array does not support the text format".into(),
        ))
    }

    fn encode_binary(&self, registry: &TypeRegistry, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.status {
            Status::Undefined => Err(encode_undefined("array")),
            Status::Null => Ok(IsNull::Yes),
            Status::Present => {
                let element_oid = registry.oid_of::<T>().ok_or_else(|| {
                    Error::Encode(format!(
                        "array element type {} is not registered, cannot resolve oid",
                        std::any::type_name::<T>()
                    ))
                })?;

                if self.expected_len() != Some(self.elements.len()) {
                    return Err(Error::Encode(format!(
                        "array dimensions do not cover {} elements",
                        self.elements.len()
                    )));
                }

                let dimension_count = i32::try_from(self.dimensions.len())
                    .map_err(|_| Error::Encode("array has too many dimensions".into()))?;
                let has_nulls = self
                    .elements
                    .iter()
                    .any(|element| element.status() == Status::Null);

                buf.extend_from_slice(&dimension_count.to_be_bytes());
                buf.extend_from_slice(&i32::from(has_nulls).to_be_bytes());
                buf.extend_from_slice(&element_oid.to_be_bytes());
                for dimension in &self.dimensions {
                    buf.extend_from_slice(&dimension.len.to_be_bytes());
                    buf.extend_from_slice(&dimension.lower_bound.to_be_bytes());
                }

                let mut element_buf = Vec::new();
                for element in &self.elements {
                    element_buf.clear();
                    match element.encode_binary(registry, &mut element_buf)? {
                        IsNull::Yes => buf.extend_from_slice(&(-1_i32).to_be_bytes()),
                        IsNull::No => {
                            let element_len = i32::try_from(element_buf.len())
                                .map_err(|_| Error::Encode("array element is too long".into()))?;
                            buf.extend_from_slice(&element_len.to_be_bytes());
                            buf.extend_from_slice(&element_buf);
                        }
                    }
                }
                Ok(IsNull::No)
            }
        }
    }

    fn encode_text(&self, _registry: &TypeRegistry, _buf: &mut Vec<u8>) -> Result<IsNull> {
        Err(Error::Unsupported(
            "array does not support the text format".into(),
        ))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// The `bool[]` type.
pub type BoolArray = Array<super::primitives::Bool>;
/// The `bytea[]` type.
pub type ByteaArray = Array<super::bytes::Bytea>;
/// The `int2[]` type.
pub type Int2Array = Array<super::primitives::Int2>;
/// The `int4[]` type.
pub type Int4Array = Array<super::primitives::Int4>;
/// The `int8[]` type.
pub type Int8Array = Array<super::primitives::Int8>;
/// The `float4[]` type.
pub type Float4Array = Array<super::primitives::Float4>;
/// The `float8[]` type.
pub type Float8Array = Array<super::primitives::Float8>;
/// The `text[]` type.
pub type TextArray = Array<super::text::Text>;
/// The `varchar[]` type.
pub type VarcharArray = Array<super::text::Varchar>;
