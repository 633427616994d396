//! Value codecs.
//!
//! A [`Type`] knows how to validate one kind of value on each side of the
//! mapping and how to convert between the two. Types are stateless, so a
//! [`TypeRegistry`] hands out exactly one shared instance per implementation
//! and metadata compares them by identity.

mod builtin;

pub use builtin::{
    BooleanType, DateType, FloatType, IntegerType, ObjectIdType, StringIdType, StringType,
    UuidType,
};

use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Direction, OdmError, Result, Value};

/// Codec between a model value and its persisted encoding.
///
/// `convert_*` are only called on values accepted by the matching validity
/// predicate; use the checked [`to_persisted`](Type::to_persisted) and
/// [`to_model`](Type::to_model) wrappers everywhere else.
pub trait Type: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn is_valid_model_value(&self, value: &Value) -> bool;

    fn is_valid_persisted_value(&self, value: &Value) -> bool;

    fn convert_to_persisted(&self, value: &Value) -> Value;

    fn convert_to_model(&self, value: &Value) -> Value;

    /// Whether [`create_model_value`](Type::create_model_value) can synthesize values.
    fn can_create_model_value(&self) -> bool {
        false
    }

    fn create_model_value(&self, _seed: Option<&Value>) -> Option<Value> {
        None
    }

    /// Null is treated as absent and passes through untouched.
    fn to_persisted(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if !self.is_valid_model_value(value) {
            return Err(OdmError::invalid_value(
                self.name(),
                value,
                Direction::ToPersisted,
            ));
        }
        Ok(self.convert_to_persisted(value))
    }

    /// Encodes a value found in a filter or update expression. Defaults to
    /// [`to_persisted`](Type::to_persisted); types override it to accept
    /// looser spellings that never appear as model values.
    fn to_persisted_expression(&self, value: &Value) -> Result<Value> {
        self.to_persisted(value)
    }

    fn to_model(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if !self.is_valid_persisted_value(value) {
            return Err(OdmError::invalid_value(
                self.name(),
                value,
                Direction::ToModel,
            ));
        }
        Ok(self.convert_to_model(value))
    }
}

/// Flyweight registry of [`Type`] instances, keyed by implementation and by
/// the name used in declarative configuration.
pub struct TypeRegistry {
    by_impl: RwLock<HashMap<TypeId, Arc<dyn Type>>>,
    by_name: RwLock<HashMap<String, Arc<dyn Type>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            by_impl: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with every built-in type registered under its name.
    pub fn with_builtin_types() -> Self {
        let registry = Self::new();
        registry.get::<ObjectIdType>();
        registry.get::<StringIdType>();
        registry.get::<UuidType>();
        registry.get::<StringType>();
        registry.get::<IntegerType>();
        registry.get::<FloatType>();
        registry.get::<BooleanType>();
        registry.get::<DateType>();
        registry
    }

    /// Returns the shared instance of `T`, constructing it on first request.
    pub fn get<T: Type + Default>(&self) -> Arc<dyn Type> {
        if let Some(existing) = self.by_impl.read().get(&TypeId::of::<T>()) {
            return existing.clone();
        }
        let mut by_impl = self.by_impl.write();
        let instance = by_impl
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(T::default()) as Arc<dyn Type>)
            .clone();
        self.by_name
            .write()
            .entry(instance.name().to_string())
            .or_insert_with(|| instance.clone());
        instance
    }

    /// Registers a prebuilt instance, replacing any earlier instance of `T`
    /// and any type registered under the same name.
    pub fn register<T: Type>(&self, instance: T) -> Arc<dyn Type> {
        let instance: Arc<dyn Type> = Arc::new(instance);
        self.by_impl
            .write()
            .insert(TypeId::of::<T>(), instance.clone());
        self.by_name
            .write()
            .insert(instance.name().to_string(), instance.clone());
        instance
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Type>> {
        self.by_name.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtin_types()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.names())
            .finish()
    }
}
