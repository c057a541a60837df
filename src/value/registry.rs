//! Run-time type registry mapping oids, type names and native types to
//! codec constructors.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::types::{Oid, oid};
use crate::value::array::{
    BoolArray, ByteaArray, Float4Array, Float8Array, Int2Array, Int4Array, Int8Array, TextArray,
    VarcharArray,
};
use crate::value::bytes::Bytea;
use crate::value::primitives::{Bool, Float4, Float8, Int2, Int4, Int8};
use crate::value::record::Record;
use crate::value::text::{Text, Varchar};
use crate::value::WireValue;

/// A registered type: its catalog identity plus a constructor for fresh
/// codec instances.
#[derive(Debug, Clone)]
pub struct DataType {
    name: String,
    oid: Oid,
    rust_type: TypeId,
    constructor: fn() -> Box<dyn WireValue>,
}

impl DataType {
    /// Describe a value type under a catalog name and oid.
    pub fn new<T>(name: impl Into<String>, oid: Oid) -> Self
    where
        T: WireValue + Default + 'static,
    {
        Self {
            name: name.into(),
            oid,
            rust_type: TypeId::of::<T>(),
            constructor: || Box::new(T::default()),
        }
    }

    /// Catalog type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog oid.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// The native type this entry was registered for.
    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    /// Construct a fresh undefined value of this type.
    pub fn new_value(&self) -> Box<dyn WireValue> {
        (self.constructor)()
    }
}

/// Registry with three lookup directions: by oid, by name and by native
/// type. Registering a type that collides with an existing entry on any key
/// silently replaces that entry on that key.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_oid: HashMap<Oid, Arc<DataType>>,
    by_name: HashMap<String, Arc<DataType>>,
    by_rust_type: HashMap<TypeId, Arc<DataType>>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with every built-in type.
    ///
    /// Extension types such as hstore have installation-assigned oids and
    /// must be registered by the caller once the oid is known:
    ///
    /// ```
    /// # use pgbulk::value::{DataType, Hstore, TypeRegistry};
    /// let mut registry = TypeRegistry::with_defaults();
    /// let hstore_oid = 16_385; // from pg_type
    /// registry.register(DataType::new::<Hstore>("hstore", hstore_oid));
    /// ```
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DataType::new::<Bool>("bool", oid::BOOL));
        registry.register(DataType::new::<Bytea>("bytea", oid::BYTEA));
        registry.register(DataType::new::<Int2>("int2", oid::INT2));
        registry.register(DataType::new::<Int4>("int4", oid::INT4));
        registry.register(DataType::new::<Int8>("int8", oid::INT8));
        registry.register(DataType::new::<Float4>("float4", oid::FLOAT4));
        registry.register(DataType::new::<Float8>("float8", oid::FLOAT8));
        registry.register(DataType::new::<Text>("text", oid::TEXT));
        registry.register(DataType::new::<Varchar>("varchar", oid::VARCHAR));
        registry.register(DataType::new::<Record>("record", oid::RECORD));
        registry.register(DataType::new::<BoolArray>("_bool", oid::BOOL_ARRAY));
        registry.register(DataType::new::<ByteaArray>("_bytea", oid::BYTEA_ARRAY));
        registry.register(DataType::new::<Int2Array>("_int2", oid::INT2_ARRAY));
        registry.register(DataType::new::<Int4Array>("_int4", oid::INT4_ARRAY));
        registry.register(DataType::new::<Int8Array>("_int8", oid::INT8_ARRAY));
        registry.register(DataType::new::<Float4Array>("_float4", oid::FLOAT4_ARRAY));
        registry.register(DataType::new::<Float8Array>("_float8", oid::FLOAT8_ARRAY));
        registry.register(DataType::new::<TextArray>("_text", oid::TEXT_ARRAY));
        registry.register(DataType::new::<VarcharArray>("_varchar", oid::VARCHAR_ARRAY));
        registry
    }

    /// Register a type under all three lookup keys.
    pub fn register(&mut self, data_type: DataType) {
        let entry = Arc::new(data_type);
        self.by_oid.insert(entry.oid(), Arc::clone(&entry));
        self.by_name
            .insert(entry.name().to_owned(), Arc::clone(&entry));
        self.by_rust_type.insert(entry.rust_type(), entry);
    }

    /// Look up a type by oid.
    pub fn by_oid(&self, oid: Oid) -> Option<&DataType> {
        self.by_oid.get(&oid).map(Arc::as_ref)
    }

    /// Look up a type by catalog name.
    pub fn by_name(&self, name: &str) -> Option<&DataType> {
        self.by_name.get(name).map(Arc::as_ref)
    }

    /// Look up a type by native type.
    pub fn by_rust_type<T: 'static>(&self) -> Option<&DataType> {
        self.by_type_id(TypeId::of::<T>())
    }

    /// Look up a type by a run-time type id, e.g. from
    /// [`WireValue::as_any`].
    pub fn by_type_id(&self, type_id: TypeId) -> Option<&DataType> {
        self.by_rust_type.get(&type_id).map(Arc::as_ref)
    }

    /// Construct a fresh value for an oid, if registered.
    pub fn new_value_for_oid(&self, oid: Oid) -> Option<Box<dyn WireValue>> {
        self.by_oid(oid).map(DataType::new_value)
    }

    /// The oid registered for a native type, if any.
    pub fn oid_of<T: 'static>(&self) -> Option<Oid> {
        self.by_rust_type::<T>().map(DataType::oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Status, Tristate};

    #[test]
    fn three_way_lookup() {
        let registry = TypeRegistry::with_defaults();

        let by_oid = registry.by_oid(oid::INT4).unwrap();
        assert_eq!(by_oid.name(), "int4");

        let by_name = registry.by_name("int4").unwrap();
        assert_eq!(by_name.oid(), oid::INT4);

        let by_type = registry.by_rust_type::<Int4>().unwrap();
        assert_eq!(by_type.oid(), oid::INT4);

        assert!(registry.by_oid(999_999).is_none());
        assert!(registry.by_name("no_such_type").is_none());
    }

    #[test]
    fn constructed_values_start_undefined() {
        let registry = TypeRegistry::with_defaults();
        let value = registry.new_value_for_oid(oid::TEXT).unwrap();
        assert_eq!(value.status(), Status::Undefined);
        assert!(value.as_any().is::<Text>());
    }

    #[test]
    fn constructed_value_decodes() {
        let registry = TypeRegistry::with_defaults();
        let mut value = registry.new_value_for_oid(oid::INT8).unwrap();
        value
            .decode_binary(&registry, Some(&42_i64.to_be_bytes()))
            .unwrap();
        let int8 = value.as_any().downcast_ref::<Int8>().unwrap();
        assert_eq!(int8.get(), Tristate::Present(42));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = TypeRegistry::with_defaults();
        registry.register(DataType::new::<Text>("citext", oid::TEXT));

        // The oid and native-type keys now resolve to the new entry, and the
        // old name key still resolves to the old one.
        assert_eq!(registry.by_oid(oid::TEXT).unwrap().name(), "citext");
        assert_eq!(registry.by_rust_type::<Text>().unwrap().name(), "citext");
        assert_eq!(registry.by_name("text").unwrap().oid(), oid::TEXT);
    }

    #[test]
    fn extension_type_registration() {
        use crate::value::Hstore;

        let mut registry = TypeRegistry::with_defaults();
        assert!(registry.by_name("hstore").is_none());

        registry.register(DataType::new::<Hstore>("hstore", 16_385));
        assert_eq!(registry.by_name("hstore").unwrap().oid(), 16_385);
        assert_eq!(registry.oid_of::<Hstore>(), Some(16_385));
    }

    #[test]
    fn varchar_and_text_are_distinct() {
        let registry = TypeRegistry::with_defaults();
        assert_eq!(registry.oid_of::<Text>(), Some(oid::TEXT));
        assert_eq!(registry.oid_of::<Varchar>(), Some(oid::VARCHAR));
    }
}
