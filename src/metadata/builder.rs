use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::document::{
    DiscriminatorMetadata, DocumentMetadata, FieldMetadata, MetadataGraph, MetadataId,
};
use super::registration::{ClassRegistration, FieldDeclaration, IDENTIFIER_FIELD, MetadataRegistry};
use crate::core::{ClassId, OdmError, Result};
use crate::types::TypeRegistry;

/// Turns registrations into a [`MetadataGraph`].
///
/// Every registered class gets an id up front; fields are then resolved
/// against that index, so embedded references (including cycles) never
/// require the target to be built first.
pub struct MetadataBuilder<'a> {
    registry: &'a MetadataRegistry,
    types: &'a TypeRegistry,
}

impl<'a> MetadataBuilder<'a> {
    pub fn new(registry: &'a MetadataRegistry, types: &'a TypeRegistry) -> Self {
        Self { registry, types }
    }

    pub fn build(&self) -> Result<MetadataGraph> {
        let index: HashMap<ClassId, MetadataId> = self
            .registry
            .iter()
            .enumerate()
            .map(|(i, (class, _))| (class.clone(), MetadataId(i)))
            .collect();

        let mut documents = Vec::with_capacity(index.len());
        for (i, (class, registration)) in self.registry.iter().enumerate() {
            let document = self.build_document(MetadataId(i), class, registration, &index)?;
            debug!(
                class = %class,
                fields = document.fields.len(),
                root = document.is_root(),
                "resolved class metadata"
            );
            documents.push(document);
        }

        for document in &documents {
            for field in document.fields.values() {
                if let Some(target) = field.embedded {
                    if documents[target.0].fields.is_empty() {
                        return Err(OdmError::configuration(
                            &document.class,
                            format!(
                                "field '{}' embeds '{}', which declares no fields",
                                field.property, documents[target.0].class
                            ),
                        ));
                    }
                }
            }
        }

        info!(
            classes = documents.len(),
            roots = documents.iter().filter(|d| d.is_root()).count(),
            "built document metadata"
        );

        Ok(MetadataGraph { documents, index })
    }

    /// The registration followed by its superclasses, nearest first.
    fn lineage(
        &self,
        class: &ClassId,
        registration: &'a ClassRegistration,
    ) -> Result<Vec<&'a ClassRegistration>> {
        let mut lineage = vec![registration];
        let mut seen = HashSet::from([class.clone()]);
        let mut current = registration;

        while let Some(parent) = &current.extends {
            let parent_id = ClassId::new(parent);
            if !seen.insert(parent_id.clone()) {
                return Err(OdmError::configuration(class, "inheritance cycle"));
            }
            current = self.registry.get(&parent_id).ok_or_else(|| {
                OdmError::configuration(class, format!("superclass '{}' is not registered", parent))
            })?;
            lineage.push(current);
        }

        Ok(lineage)
    }

    fn build_document(
        &self,
        id: MetadataId,
        class: &ClassId,
        registration: &'a ClassRegistration,
        index: &HashMap<ClassId, MetadataId>,
    ) -> Result<DocumentMetadata> {
        let lineage = self.lineage(class, registration)?;

        let mut own = HashSet::new();
        for field in &registration.fields {
            if !own.insert(field.property.as_str()) {
                return Err(OdmError::configuration(
                    class,
                    format!("property '{}' declared twice", field.property),
                ));
            }
        }

        // Ancestors first so the subclass overwrites inherited declarations
        // while keeping their position.
        let mut declared: IndexMap<&str, (&ClassRegistration, &FieldDeclaration)> =
            IndexMap::new();
        for owner in lineage.iter().rev().copied() {
            for field in &owner.fields {
                declared.insert(field.property.as_str(), (owner, field));
            }
        }

        let mut fields = IndexMap::with_capacity(declared.len());
        let mut by_property = HashMap::with_capacity(declared.len());
        let mut identifier = None;

        for (owner, declaration) in declared.values() {
            let field = self.resolve_field(class, owner, declaration, index)?;
            if field.is_identifier {
                if identifier.is_some() {
                    return Err(OdmError::configuration(class, "more than one identifier field"));
                }
                identifier = Some(field.name.clone());
            }
            if fields.contains_key(&field.name) {
                return Err(OdmError::configuration(
                    class,
                    format!("persisted name '{}' used by more than one field", field.name),
                ));
            }
            by_property.insert(field.property.clone(), field.name.clone());
            fields.insert(field.name.clone(), field);
        }

        let collection = lineage.iter().find_map(|r| r.collection.clone());
        if collection.is_some() && identifier.is_none() {
            return Err(OdmError::configuration(
                class,
                "root document must declare exactly one identifier field",
            ));
        }

        let back_reference = lineage.iter().find_map(|r| r.back_reference.clone());
        if let Some(property) = &back_reference {
            if by_property.contains_key(property) {
                return Err(OdmError::configuration(
                    class,
                    format!("back-reference '{}' collides with a declared field", property),
                ));
            }
        }

        let discriminator = match &registration.discriminator {
            Some(declaration) => {
                let name = by_property.get(&declaration.field).ok_or_else(|| {
                    OdmError::configuration(
                        class,
                        format!(
                            "discriminator field '{}' is not a declared field",
                            declaration.field
                        ),
                    )
                })?;
                let mut map = IndexMap::with_capacity(declaration.map.len());
                for (value, variant) in &declaration.map {
                    let variant_id = ClassId::new(variant);
                    map.insert(value.clone(), self.resolve_variant(class, &variant_id, index)?);
                }
                Some(DiscriminatorMetadata {
                    property: declaration.field.clone(),
                    name: name.clone(),
                    map,
                })
            }
            None => None,
        };

        Ok(DocumentMetadata {
            id,
            class: class.clone(),
            collection,
            fields,
            by_property,
            identifier,
            back_reference,
            discriminator,
        })
    }

    fn resolve_field(
        &self,
        class: &ClassId,
        owner: &ClassRegistration,
        declaration: &FieldDeclaration,
        index: &HashMap<ClassId, MetadataId>,
    ) -> Result<FieldMetadata> {
        let fail = |reason: String| {
            OdmError::configuration(class, format!("field '{}': {}", declaration.property, reason))
        };

        let ty = match &declaration.type_name {
            Some(type_name) => Some(
                self.types
                    .by_name(type_name)
                    .ok_or_else(|| fail(format!("unknown type '{}'", type_name)))?,
            ),
            None => None,
        };

        let embedded = match &declaration.embedded {
            Some(target) => Some(
                *index
                    .get(&ClassId::new(target))
                    .ok_or_else(|| fail(format!("embedded class '{}' is not registered", target)))?,
            ),
            None => None,
        };

        if embedded.is_some() && ty.is_some() {
            return Err(fail("an embedded field cannot also declare a type".into()));
        }
        if declaration.identifier && embedded.is_some() {
            return Err(fail("an identifier cannot be embedded".into()));
        }
        if declaration.create {
            match &ty {
                None => return Err(fail("value creation requires a type".into())),
                Some(ty) if !ty.can_create_model_value() => {
                    return Err(fail(format!("type '{}' cannot create values", ty.name())));
                }
                Some(_) if declaration.array => {
                    return Err(fail("value creation is not supported on arrays".into()));
                }
                Some(_) => {}
            }
        }

        let name = if declaration.identifier {
            IDENTIFIER_FIELD.to_string()
        } else {
            declaration.persisted_name().to_string()
        };

        Ok(FieldMetadata {
            class: owner.class_id(),
            property: declaration.property.clone(),
            name,
            is_identifier: declaration.identifier,
            is_embedded: embedded.is_some(),
            is_embedded_array: embedded.is_some() && declaration.array,
            embedded,
            type_is_array: ty.is_some() && declaration.array,
            ty,
            should_create_value: declaration.create,
        })
    }

    fn resolve_variant(
        &self,
        base: &ClassId,
        variant: &ClassId,
        index: &HashMap<ClassId, MetadataId>,
    ) -> Result<MetadataId> {
        let id = *index.get(variant).ok_or_else(|| {
            OdmError::configuration(base, format!("variant '{}' is not registered", variant))
        })?;
        if variant == base {
            return Err(OdmError::configuration(
                base,
                "a discriminator cannot map to its own class",
            ));
        }
        let registration = self
            .registry
            .get(variant)
            .ok_or_else(|| OdmError::UnknownClass(variant.to_string()))?;
        let extends_base = self
            .lineage(variant, registration)?
            .iter()
            .any(|r| r.class == base.as_str());
        if !extends_base {
            return Err(OdmError::configuration(
                base,
                format!("variant '{}' does not extend '{}'", variant, base),
            ));
        }
        Ok(id)
    }
}
