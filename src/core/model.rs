use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::core::{Document, ObjectId, Value};

/// Identity of a mapped class.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(Arc<str>);

impl ClassId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Class id derived from a Rust type's path, for models bound to structs.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ClassId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&ClassId> for ClassId {
    fn from(id: &ClassId) -> Self {
        id.clone()
    }
}

/// Model-side property map.
pub type Props = IndexMap<String, Property>;

/// A property value on the model side.
#[derive(Debug, Clone)]
pub enum Property {
    /// Scalar leaf.
    Value(Value),
    List(Vec<Property>),
    /// Plain, unclassed map of properties.
    Map(Props),
    /// Embedded model instance.
    Model(ModelRef),
}

impl Property {
    /// Lifts a stored value into the model side. Arrays become lists and
    /// documents become plain maps so that equality is structural.
    pub fn from_raw(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items.into_iter().map(Property::from_raw).collect()),
            Value::Document(doc) => Self::Map(
                doc.into_iter()
                    .map(|(key, value)| (key, Property::from_raw(value)))
                    .collect(),
            ),
            other => Self::Value(other),
        }
    }

    /// Lowers the property into a stored value without any type conversion.
    pub fn to_raw(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::List(items) => Value::Array(items.iter().map(Property::to_raw).collect()),
            Self::Map(props) => Value::Document(props_to_raw(props)),
            Self::Model(model) => Value::Document(props_to_raw(model.read().properties())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_list(&self) -> Option<&Vec<Property>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Props> {
        match self {
            Self::Map(props) => Some(props),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelRef> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Model(a), Self::Model(b)) => a == b,
            _ => false,
        }
    }
}

fn props_to_raw(props: &Props) -> Document {
    props
        .iter()
        .map(|(key, value)| (key.clone(), value.to_raw()))
        .collect()
}

impl From<Value> for Property {
    fn from(value: Value) -> Self {
        Self::from_raw(value)
    }
}

impl From<serde_json::Value> for Property {
    fn from(json: serde_json::Value) -> Self {
        Self::from_raw(Value::from(json))
    }
}

impl From<&str> for Property {
    fn from(s: &str) -> Self {
        Self::Value(Value::from(s))
    }
}

impl From<String> for Property {
    fn from(s: String) -> Self {
        Self::Value(Value::Text(s))
    }
}

impl From<i64> for Property {
    fn from(i: i64) -> Self {
        Self::Value(Value::Integer(i))
    }
}

impl From<f64> for Property {
    fn from(f: f64) -> Self {
        Self::Value(Value::Float(f))
    }
}

impl From<bool> for Property {
    fn from(b: bool) -> Self {
        Self::Value(Value::Boolean(b))
    }
}

impl From<ObjectId> for Property {
    fn from(id: ObjectId) -> Self {
        Self::Value(Value::ObjectId(id))
    }
}

impl From<Uuid> for Property {
    fn from(u: Uuid) -> Self {
        Self::Value(Value::Uuid(u))
    }
}

impl From<Vec<Property>> for Property {
    fn from(items: Vec<Property>) -> Self {
        Self::List(items)
    }
}

impl From<Props> for Property {
    fn from(props: Props) -> Self {
        Self::Map(props)
    }
}

impl From<ModelRef> for Property {
    fn from(model: ModelRef) -> Self {
        Self::Model(model)
    }
}

/// Builds [`Props`] from a JSON object literal; non-objects yield an empty map.
pub fn props_from_json(json: serde_json::Value) -> Props {
    match Property::from(json) {
        Property::Map(props) => props,
        _ => Props::new(),
    }
}

#[derive(Debug)]
struct BackReference {
    property: String,
    parent: Weak<RwLock<ModelObject>>,
}

/// A model instance: its class, its properties and, for embedded instances,
/// a weak link to the enclosing parent.
#[derive(Debug)]
pub struct ModelObject {
    class: ClassId,
    properties: Props,
    back_reference: Option<BackReference>,
}

impl ModelObject {
    pub fn new(class: impl Into<ClassId>) -> Self {
        Self {
            class: class.into(),
            properties: Props::new(),
            back_reference: None,
        }
    }

    pub fn with_properties(class: impl Into<ClassId>, properties: Props) -> Self {
        Self {
            class: class.into(),
            properties,
            back_reference: None,
        }
    }

    pub fn class(&self) -> &ClassId {
        &self.class
    }

    pub fn get(&self, property: &str) -> Option<&Property> {
        self.properties.get(property)
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Property>) {
        self.properties.insert(property.into(), value.into());
    }

    pub fn remove(&mut self, property: &str) -> Option<Property> {
        self.properties.shift_remove(property)
    }

    pub fn properties(&self) -> &Props {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Props {
        &mut self.properties
    }

    /// The enclosing instance, if this one was hydrated as an embedded value
    /// of a class that declares a back-reference and the parent is still alive.
    pub fn parent(&self) -> Option<ModelRef> {
        self.back_reference
            .as_ref()
            .and_then(|back| back.parent.upgrade())
            .map(ModelRef)
    }

    pub fn back_reference_property(&self) -> Option<&str> {
        self.back_reference.as_ref().map(|back| back.property.as_str())
    }

    pub(crate) fn set_back_reference(&mut self, property: &str, parent: &ModelRef) {
        self.back_reference = Some(BackReference {
            property: property.to_string(),
            parent: Arc::downgrade(&parent.0),
        });
    }

    pub fn into_ref(self) -> ModelRef {
        ModelRef(Arc::new(RwLock::new(self)))
    }
}

/// Shared handle to a model instance.
#[derive(Clone)]
pub struct ModelRef(Arc<RwLock<ModelObject>>);

impl ModelRef {
    pub fn new(object: ModelObject) -> Self {
        object.into_ref()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ModelObject> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ModelObject> {
        self.0.write()
    }

    pub fn class(&self) -> ClassId {
        self.read().class().clone()
    }

    /// Cloned property value.
    pub fn get(&self, property: &str) -> Option<Property> {
        self.read().get(property).cloned()
    }

    pub fn set(&self, property: impl Into<String>, value: impl Into<Property>) {
        self.write().set(property, value);
    }

    pub fn parent(&self) -> Option<ModelRef> {
        self.read().parent()
    }

    pub fn ptr_eq(&self, other: &ModelRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Structural equality: same class and equal properties. Back-references are
/// not compared.
impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let a = self.read();
        let b = other.read();
        a.class == b.class && a.properties == b.properties
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let object = self.read();
        f.debug_struct("Model")
            .field("class", &object.class)
            .field("properties", &object.properties)
            .finish()
    }
}
