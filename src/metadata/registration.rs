//! Declarative class and field registrations.
//!
//! Registrations are plain data: they can be assembled with the builder
//! methods below or deserialized from a JSON schema document, and are read
//! exactly once when the metadata graph is built.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{ClassId, OdmError, Result};

/// Persisted name reserved for the identifier field of a document.
pub const IDENTIFIER_FIELD: &str = "_id";

/// Declaration of one property of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub property: String,
    /// Persisted name; defaults to the property name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Registered type name; absent means the value passes through untouched.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Embedded class; mutually exclusive with `type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<String>,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub identifier: bool,
}

impl FieldDeclaration {
    /// Untyped scalar field.
    pub fn field(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            name: None,
            type_name: None,
            embedded: None,
            array: false,
            create: false,
            identifier: false,
        }
    }

    /// Identifier field, persisted as `_id` and generated when absent.
    pub fn identifier(property: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: Some(IDENTIFIER_FIELD.to_string()),
            type_name: Some(type_name.into()),
            create: true,
            identifier: true,
            ..Self::field(property)
        }
    }

    pub fn embedded(property: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            embedded: Some(class.into()),
            ..Self::field(property)
        }
    }

    pub fn embedded_array(property: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            array: true,
            ..Self::embedded(property, class)
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn typed(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn create(mut self) -> Self {
        self.create = true;
        self
    }

    pub fn create_value(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn persisted_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.property)
    }
}

/// Tag field plus the mapping from tag value to concrete class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorDeclaration {
    /// Property holding the tag.
    pub field: String,
    pub map: IndexMap<String, String>,
}

impl DiscriminatorDeclaration {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            map: IndexMap::new(),
        }
    }

    pub fn variant(mut self, value: impl Into<String>, class: impl Into<String>) -> Self {
        self.map.insert(value.into(), class.into());
        self
    }
}

/// Declaration of one mapped class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRegistration {
    pub class: String,
    /// Collection name for root documents; embedded classes have none.
    /// Inherited from the superclass when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
    /// Property that receives the enclosing instance when embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<DiscriminatorDeclaration>,
}

impl ClassRegistration {
    pub fn document(class: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..Self::embedded(class)
        }
    }

    pub fn embedded(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            collection: None,
            extends: None,
            fields: Vec::new(),
            back_reference: None,
            discriminator: None,
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.extends = Some(superclass.into());
        self
    }

    pub fn field(mut self, field: FieldDeclaration) -> Self {
        self.fields.push(field);
        self
    }

    pub fn back_reference(mut self, property: impl Into<String>) -> Self {
        self.back_reference = Some(property.into());
        self
    }

    pub fn discriminator(mut self, discriminator: DiscriminatorDeclaration) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    pub fn class_id(&self) -> ClassId {
        ClassId::new(&self.class)
    }
}

/// JSON shape accepted by [`MetadataRegistry::from_json_str`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub classes: Vec<ClassRegistration>,
}

/// Registrations keyed by class, in registration order.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    classes: IndexMap<ClassId, ClassRegistration>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: ClassRegistration) -> Result<&mut Self> {
        let class = registration.class_id();
        if self.classes.contains_key(&class) {
            return Err(OdmError::configuration(&class, "class registered twice"));
        }
        self.classes.insert(class, registration);
        Ok(self)
    }

    /// Chaining variant of [`register`](Self::register) for building registries inline.
    pub fn with(mut self, registration: ClassRegistration) -> Result<Self> {
        self.register(registration)?;
        Ok(self)
    }

    pub fn from_config(config: SchemaConfig) -> Result<Self> {
        let mut registry = Self::new();
        for registration in config.classes {
            registry.register(registration)?;
        }
        Ok(registry)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SchemaConfig = serde_json::from_str(json)?;
        Self::from_config(config)
    }

    pub fn get(&self, class: &ClassId) -> Option<&ClassRegistration> {
        self.classes.get(class)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClassId, &ClassRegistration)> {
        self.classes.iter()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
