use tracing::info;

use crate::cast::ExpressionCaster;
use crate::config::MapperConfig;
use crate::core::{ClassId, Document, ModelRef, OdmError, Props, Result};
use crate::hydration::HydrationEngine;
use crate::metadata::{DocumentMetadata, MetadataBuilder, MetadataGraph, MetadataId, MetadataRegistry};
use crate::types::TypeRegistry;

/// Owns everything built at startup: types, the metadata graph, compiled
/// hydrators and caster plans. Independent managers share nothing.
pub struct DocumentManager {
    types: TypeRegistry,
    engine: HydrationEngine,
    caster: ExpressionCaster,
    config: MapperConfig,
}

impl DocumentManager {
    pub fn new(registry: &MetadataRegistry, config: MapperConfig) -> Result<Self> {
        Self::with_types(registry, TypeRegistry::with_builtin_types(), config)
    }

    /// Like [`new`](Self::new), resolving type names against `types`.
    pub fn with_types(
        registry: &MetadataRegistry,
        types: TypeRegistry,
        config: MapperConfig,
    ) -> Result<Self> {
        let graph = MetadataBuilder::new(registry, &types).build()?;
        let caster = ExpressionCaster::new(&graph, config.cast.clone());
        let engine = HydrationEngine::new(graph, config.discriminator_policy);
        info!(
            classes = engine.graph().len(),
            policy = ?config.discriminator_policy,
            "document manager ready"
        );
        Ok(Self {
            types,
            engine,
            caster,
            config,
        })
    }

    pub fn document(&self, class: impl Into<ClassId>) -> Result<DocumentMapper<'_>> {
        let class = class.into();
        let id = self
            .engine
            .graph()
            .id_of(&class)
            .ok_or_else(|| OdmError::UnknownClass(class.to_string()))?;
        Ok(DocumentMapper { manager: self, id })
    }

    /// Mapper for the class of an existing instance.
    pub fn document_of(&self, model: &ModelRef) -> Result<DocumentMapper<'_>> {
        self.document(model.class())
    }

    pub fn metadata(&self, class: impl Into<ClassId>) -> Option<&DocumentMetadata> {
        self.engine.graph().by_class(&class.into())
    }

    pub fn graph(&self) -> &MetadataGraph {
        self.engine.graph()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Compiles every hydrator now rather than on first use.
    pub fn warm_up(&self) {
        for meta in self.engine.graph().iter() {
            self.engine.precompile(meta.id());
            self.caster.requires_cast(self.engine.graph(), meta.id());
        }
    }
}

/// Entry points for one class. `None` results mean a discriminator value had
/// no variant under the permissive policy.
///
/// Mappers are the only way in; the caster and hydrators that take raw
/// metadata ids stay private to the crate:
///
/// ```compile_fail
/// use rustodm::cast::ExpressionCaster;
/// ```
#[derive(Clone, Copy)]
pub struct DocumentMapper<'m> {
    manager: &'m DocumentManager,
    id: MetadataId,
}

impl<'m> DocumentMapper<'m> {
    pub fn metadata(&self) -> &'m DocumentMetadata {
        self.manager.engine.graph().get(self.id)
    }

    pub fn class(&self) -> &'m ClassId {
        self.metadata().class()
    }

    pub fn init(&self, props: &Props) -> Result<Option<ModelRef>> {
        self.manager.engine.init(self.id, props, None)
    }

    /// Applies `props` onto `model` in place; builds a new instance when
    /// `model` is `None` or its variant no longer matches.
    pub fn merge(&self, model: Option<&ModelRef>, props: &Props) -> Result<Option<ModelRef>> {
        self.manager.engine.merge(self.id, model, props, None)
    }

    /// Encodes `model` without modifying it. A creatable field the model
    /// lacks gets a fresh value in the output only, so two calls on such a
    /// model yield different values. Run [`merge`](Self::merge) with empty
    /// props first to store the synthesized values on the model.
    pub fn to_persisted(&self, model: &ModelRef) -> Result<Option<Document>> {
        self.manager.engine.to_persisted(self.id, model)
    }

    pub fn from_persisted(&self, doc: &Document) -> Result<Option<ModelRef>> {
        self.manager.engine.from_persisted(self.id, doc, None)
    }

    pub fn cast_filter(&self, filter: &Document) -> Document {
        self.manager
            .caster
            .cast_filter(self.manager.engine.graph(), self.id, filter)
    }

    pub fn cast_update(&self, update: &Document) -> Document {
        self.manager
            .caster
            .cast_update(self.manager.engine.graph(), self.id, update)
    }
}
