//! Per-class CRUD on top of a [`CollectionStore`].
//!
//! The repository only translates: models are hydrated by the manager's
//! mappers, filters and updates go through the caster, and everything else
//! is the store's business.

mod events;
mod store;

pub use events::{EventManager, EventSubscriber};
pub use store::{CallOptions, CollectionStore, Session};

use std::sync::Arc;
use tracing::debug;

use crate::core::{ClassId, Document, ModelRef, OdmError, Props, Result};
use crate::manager::{DocumentManager, DocumentMapper};

pub struct Repository<S> {
    manager: Arc<DocumentManager>,
    store: Arc<S>,
    events: Arc<EventManager>,
    class: ClassId,
    collection: String,
}

impl<S: CollectionStore> Repository<S> {
    /// Fails unless `class` is a registered root document.
    pub fn new(manager: Arc<DocumentManager>, store: Arc<S>, class: impl Into<ClassId>) -> Result<Self> {
        let class = class.into();
        let collection = manager
            .document(class.clone())?
            .metadata()
            .collection()
            .map(str::to_string)
            .ok_or_else(|| OdmError::configuration(&class, "embedded classes have no repository"))?;
        Ok(Self {
            manager,
            store,
            events: Arc::new(EventManager::new()),
            class,
            collection,
        })
    }

    pub fn with_events(mut self, events: Arc<EventManager>) -> Self {
        self.events = events;
        self
    }

    pub fn class(&self) -> &ClassId {
        &self.class
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    fn mapper(&self) -> Result<DocumentMapper<'_>> {
        self.manager.document(self.class.clone())
    }

    /// Persists `model`, generating its identifier first when creatable.
    /// Returns the instance that was stored.
    pub async fn insert(&self, model: &ModelRef, options: &CallOptions) -> Result<ModelRef> {
        let mapper = self.mapper()?;
        let model = mapper
            .merge(Some(model), &Props::new())?
            .ok_or_else(|| self.unmapped(&mapper, model))?;

        self.events.before_insert(&model).await?;
        let document = mapper
            .to_persisted(&model)?
            .ok_or_else(|| self.unmapped(&mapper, &model))?;
        debug!(collection = %self.collection, fields = document.len(), "insert_one");
        self.store
            .insert_one(&self.collection, document.clone(), options)
            .await?;
        self.events.after_insert(&model, &document).await?;
        Ok(model)
    }

    /// Documents whose discriminator maps to no variant are skipped.
    pub async fn find(&self, filter: &Document, options: &CallOptions) -> Result<Vec<ModelRef>> {
        let mapper = self.mapper()?;
        let filter = mapper.cast_filter(filter);
        let documents = self.store.find(&self.collection, &filter, options).await?;
        let mut models = Vec::with_capacity(documents.len());
        for document in &documents {
            if let Some(model) = mapper.from_persisted(document)? {
                models.push(model);
            }
        }
        Ok(models)
    }

    pub async fn find_one(&self, filter: &Document, options: &CallOptions) -> Result<Option<ModelRef>> {
        Ok(self.find(filter, options).await?.into_iter().next())
    }

    pub async fn update_one(&self, filter: &Document, update: &Document, options: &CallOptions) -> Result<u64> {
        let mapper = self.mapper()?;
        self.events.before_update(&self.class, filter, update).await?;
        let cast_filter = mapper.cast_filter(filter);
        let cast_update = mapper.cast_update(update);
        let modified = self
            .store
            .update_one(&self.collection, &cast_filter, &cast_update, options)
            .await?;
        self.events.after_update(&self.class, filter, modified).await?;
        Ok(modified)
    }

    pub async fn delete_one(&self, filter: &Document, options: &CallOptions) -> Result<u64> {
        let mapper = self.mapper()?;
        self.events.before_delete(&self.class, filter).await?;
        let cast_filter = mapper.cast_filter(filter);
        let deleted = self
            .store
            .delete_one(&self.collection, &cast_filter, options)
            .await?;
        self.events.after_delete(&self.class, filter, deleted).await?;
        Ok(deleted)
    }

    fn unmapped(&self, mapper: &DocumentMapper<'_>, model: &ModelRef) -> OdmError {
        let value = mapper
            .metadata()
            .discriminator()
            .and_then(|d| model.get(d.property()))
            .map(|tag| tag.to_raw().to_string())
            .unwrap_or_else(|| "<missing>".to_string());
        OdmError::UnmappedDiscriminator {
            class: self.class.to_string(),
            value,
        }
    }
}
