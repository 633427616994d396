use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::ClassId;
use crate::types::Type;

/// Index of a [`DocumentMetadata`] inside its [`MetadataGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetadataId(pub(crate) usize);

impl MetadataId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One property of one class.
#[derive(Clone)]
pub struct FieldMetadata {
    pub(crate) class: ClassId,
    pub(crate) property: String,
    pub(crate) name: String,
    pub(crate) is_identifier: bool,
    pub(crate) is_embedded: bool,
    pub(crate) is_embedded_array: bool,
    pub(crate) embedded: Option<MetadataId>,
    pub(crate) ty: Option<Arc<dyn Type>>,
    pub(crate) type_is_array: bool,
    pub(crate) should_create_value: bool,
}

impl FieldMetadata {
    pub fn class(&self) -> &ClassId {
        &self.class
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    /// Persisted name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_identifier(&self) -> bool {
        self.is_identifier
    }

    pub fn is_embedded(&self) -> bool {
        self.is_embedded
    }

    pub fn is_embedded_array(&self) -> bool {
        self.is_embedded_array
    }

    /// Metadata of the embedded class; resolve with [`MetadataGraph::get`].
    pub fn embedded(&self) -> Option<MetadataId> {
        self.embedded
    }

    pub fn ty(&self) -> Option<&Arc<dyn Type>> {
        self.ty.as_ref()
    }

    pub fn type_is_array(&self) -> bool {
        self.type_is_array
    }

    pub fn should_create_value(&self) -> bool {
        self.should_create_value
    }

    pub fn is_renamed(&self) -> bool {
        self.name != self.property
    }
}

impl fmt::Debug for FieldMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMetadata")
            .field("class", &self.class)
            .field("property", &self.property)
            .field("name", &self.name)
            .field("is_identifier", &self.is_identifier)
            .field("is_embedded", &self.is_embedded)
            .field("is_embedded_array", &self.is_embedded_array)
            .field("embedded", &self.embedded)
            .field("type", &self.ty.as_ref().map(|ty| ty.name()))
            .field("type_is_array", &self.type_is_array)
            .field("should_create_value", &self.should_create_value)
            .finish()
    }
}

/// Maps tag values of one field to concrete variant metadata.
#[derive(Debug, Clone)]
pub struct DiscriminatorMetadata {
    pub(crate) property: String,
    pub(crate) name: String,
    pub(crate) map: IndexMap<String, MetadataId>,
}

impl DiscriminatorMetadata {
    /// Model property holding the tag.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Persisted name of the tag field.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self, value: &str) -> Option<MetadataId> {
        self.map.get(value).copied()
    }

    pub fn variants(&self) -> impl Iterator<Item = (&str, MetadataId)> {
        self.map.iter().map(|(value, id)| (value.as_str(), *id))
    }
}

/// Mapping of one class: fields keyed by persisted name, plus identifier,
/// back-reference and discriminator information. Immutable once built.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub(crate) id: MetadataId,
    pub(crate) class: ClassId,
    pub(crate) collection: Option<String>,
    pub(crate) fields: IndexMap<String, FieldMetadata>,
    pub(crate) by_property: HashMap<String, String>,
    pub(crate) identifier: Option<String>,
    pub(crate) back_reference: Option<String>,
    pub(crate) discriminator: Option<DiscriminatorMetadata>,
}

impl DocumentMetadata {
    pub fn id(&self) -> MetadataId {
        self.id
    }

    pub fn class(&self) -> &ClassId {
        &self.class
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Root documents live in a collection; everything else is embedded.
    pub fn is_root(&self) -> bool {
        self.collection.is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.values()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    pub fn field_by_property(&self, property: &str) -> Option<&FieldMetadata> {
        self.by_property
            .get(property)
            .and_then(|name| self.fields.get(name))
    }

    /// Looks up by property first, then by persisted name.
    pub fn resolve_field(&self, segment: &str) -> Option<&FieldMetadata> {
        self.field_by_property(segment)
            .or_else(|| self.field_by_name(segment))
    }

    pub fn identifier(&self) -> Option<&FieldMetadata> {
        self.identifier
            .as_ref()
            .and_then(|name| self.fields.get(name))
    }

    pub fn back_reference(&self) -> Option<&str> {
        self.back_reference.as_deref()
    }

    pub fn discriminator(&self) -> Option<&DiscriminatorMetadata> {
        self.discriminator.as_ref()
    }
}

/// Arena holding every [`DocumentMetadata`]; embedded references are ids into
/// it, so cyclic embedding needs no special handling.
#[derive(Debug, Default)]
pub struct MetadataGraph {
    pub(crate) documents: Vec<DocumentMetadata>,
    pub(crate) index: HashMap<ClassId, MetadataId>,
}

impl MetadataGraph {
    /// # Panics
    ///
    /// Panics if `id` does not come from this graph.
    pub fn get(&self, id: MetadataId) -> &DocumentMetadata {
        &self.documents[id.0]
    }

    pub fn id_of(&self, class: &ClassId) -> Option<MetadataId> {
        self.index.get(class).copied()
    }

    pub fn by_class(&self, class: &ClassId) -> Option<&DocumentMetadata> {
        self.id_of(class).map(|id| self.get(id))
    }

    pub fn embedded(&self, field: &FieldMetadata) -> Option<&DocumentMetadata> {
        field.embedded.map(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentMetadata> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
