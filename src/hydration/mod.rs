//! Hydration engine.
//!
//! Each [`DocumentMetadata`] gets four transformation routines built from
//! per-field steps the first time the class is used:
//!
//! - `to_persisted` - model instance to persisted document
//! - `from_persisted` - persisted document to a new model instance
//! - `init` - new model instance from model-side props
//! - `merge` - model-side props applied onto an existing instance
//!
//! Compiled routines are cached per metadata for the lifetime of the engine.
//! Classes with a discriminator dispatch to the variant's routines before
//! any field is touched.

mod compiler;

use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::DiscriminatorPolicy;
use crate::core::{Document, ModelObject, ModelRef, OdmError, Property, Props, Result, Value};
use crate::metadata::{DiscriminatorMetadata, DocumentMetadata, MetadataGraph, MetadataId};
use compiler::{CompiledHydrator, compile};

pub(crate) struct HydrationEngine {
    graph: MetadataGraph,
    compiled: Vec<OnceLock<CompiledHydrator>>,
    policy: DiscriminatorPolicy,
}

impl HydrationEngine {
    pub fn new(graph: MetadataGraph, policy: DiscriminatorPolicy) -> Self {
        let compiled = (0..graph.len()).map(|_| OnceLock::new()).collect();
        Self {
            graph,
            compiled,
            policy,
        }
    }

    pub fn graph(&self) -> &MetadataGraph {
        &self.graph
    }

    #[cfg(test)]
    pub(crate) fn is_compiled(&self, id: MetadataId) -> bool {
        self.compiled[id.index()].get().is_some()
    }

    /// Compiles the routines of `id` now instead of on first use.
    pub fn precompile(&self, id: MetadataId) {
        self.hydrator(id);
    }

    fn hydrator(&self, id: MetadataId) -> &CompiledHydrator {
        // Compilation never recurses into other slots: embedded classes are
        // looked up by id when the routine runs.
        self.compiled[id.index()].get_or_init(|| {
            let meta = self.graph.get(id);
            debug!(class = %meta.class(), fields = meta.field_count(), "compiled hydrator");
            compile(self, meta)
        })
    }

    pub fn to_persisted(&self, id: MetadataId, model: &ModelRef) -> Result<Option<Document>> {
        let meta = self.graph.get(id);
        if let Some(discriminator) = meta.discriminator() {
            let tag = model
                .read()
                .get(discriminator.property())
                .and_then(property_discriminant);
            return match self.variant(meta, discriminator, tag)? {
                Some(variant) => self.to_persisted(variant, model),
                None => Ok(None),
            };
        }

        let hydrator = self.hydrator(id);
        let object = model.read();
        let mut doc = Document::with_capacity(meta.field_count());
        for step in &hydrator.to_persisted {
            step(self, &object, &mut doc)?;
        }
        Ok(Some(doc))
    }

    pub fn from_persisted(
        &self,
        id: MetadataId,
        doc: &Document,
        parent: Option<&ModelRef>,
    ) -> Result<Option<ModelRef>> {
        let meta = self.graph.get(id);
        if let Some(discriminator) = meta.discriminator() {
            let tag = doc.get(discriminator.name()).and_then(discriminant);
            return match self.variant(meta, discriminator, tag)? {
                Some(variant) => self.from_persisted(variant, doc, parent),
                None => Ok(None),
            };
        }

        let hydrator = self.hydrator(id);
        let target = ModelObject::new(meta.class().clone()).into_ref();
        let mut props = Props::with_capacity(meta.field_count());
        for step in &hydrator.from_persisted {
            step(self, doc, &target, &mut props)?;
        }
        attach(meta, &target, props, parent);
        Ok(Some(target))
    }

    pub fn init(
        &self,
        id: MetadataId,
        props: &Props,
        parent: Option<&ModelRef>,
    ) -> Result<Option<ModelRef>> {
        let meta = self.graph.get(id);
        if let Some(discriminator) = meta.discriminator() {
            let tag = props
                .get(discriminator.property())
                .and_then(property_discriminant);
            return match self.variant(meta, discriminator, tag)? {
                Some(variant) => self.init(variant, props, parent),
                None => Ok(None),
            };
        }

        let hydrator = self.hydrator(id);
        let target = ModelObject::new(meta.class().clone()).into_ref();
        let mut built = Props::with_capacity(meta.field_count());
        for step in &hydrator.init {
            step(self, props, &target, &mut built)?;
        }
        prepare(hydrator, &mut built);
        attach(meta, &target, built, parent);
        Ok(Some(target))
    }

    pub fn merge(
        &self,
        id: MetadataId,
        model: Option<&ModelRef>,
        props: &Props,
        parent: Option<&ModelRef>,
    ) -> Result<Option<ModelRef>> {
        let Some(model) = model else {
            return self.init(id, props, parent);
        };

        let meta = self.graph.get(id);
        if let Some(discriminator) = meta.discriminator() {
            let tag = match props.get(discriminator.property()) {
                Some(value) => property_discriminant(value),
                None => model
                    .read()
                    .get(discriminator.property())
                    .and_then(property_discriminant),
            };
            let Some(variant) = self.variant(meta, discriminator, tag)? else {
                return Ok(None);
            };
            // A variant change replaces the instance instead of patching it.
            if model.class() != *self.graph.get(variant).class() {
                return self.init(variant, props, parent);
            }
            return self.merge(variant, Some(model), props, parent);
        }

        let hydrator = self.hydrator(id);
        let patch = {
            let existing = model.read();
            let mut patch = Props::with_capacity(props.len());
            for step in &hydrator.merge {
                step(self, props, existing.properties(), model, &mut patch)?;
            }
            patch
        };

        let mut object = model.write();
        object.properties_mut().extend(patch);
        prepare(hydrator, object.properties_mut());
        if let (Some(property), Some(parent)) = (meta.back_reference(), parent) {
            object.set_back_reference(property, parent);
        }
        drop(object);
        Ok(Some(model.clone()))
    }

    fn variant(
        &self,
        meta: &DocumentMetadata,
        discriminator: &DiscriminatorMetadata,
        tag: Option<String>,
    ) -> Result<Option<MetadataId>> {
        if let Some(variant) = tag.as_deref().and_then(|t| discriminator.variant(t)) {
            return Ok(Some(variant));
        }
        let shown = tag.unwrap_or_else(|| "<missing>".to_string());
        match self.policy {
            DiscriminatorPolicy::Permissive => {
                warn!(
                    class = %meta.class(),
                    field = discriminator.property(),
                    value = %shown,
                    "no variant for discriminator value"
                );
                Ok(None)
            }
            DiscriminatorPolicy::Strict => Err(OdmError::UnmappedDiscriminator {
                class: meta.class().to_string(),
                value: shown,
            }),
        }
    }
}

/// Synthesizes creatable fields that are still absent.
fn prepare(hydrator: &CompiledHydrator, props: &mut Props) {
    for creatable in &hydrator.creatable {
        let absent = props
            .get(&creatable.property)
            .is_none_or(Property::is_null);
        if absent {
            if let Some(value) = creatable.ty.create_model_value(None) {
                props.insert(creatable.property.clone(), Property::Value(value));
            }
        }
    }
}

fn attach(meta: &DocumentMetadata, target: &ModelRef, props: Props, parent: Option<&ModelRef>) {
    let mut object = target.write();
    *object.properties_mut() = props;
    if let (Some(property), Some(parent)) = (meta.back_reference(), parent) {
        object.set_back_reference(property, parent);
    }
}

fn discriminant(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn property_discriminant(value: &Property) -> Option<String> {
    value.as_value().and_then(discriminant)
}
