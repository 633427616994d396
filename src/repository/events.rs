use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::core::{ClassId, Document, ModelRef, Result};

/// Callbacks around repository writes. Every hook defaults to a no-op; an
/// error from a `before_*` hook aborts the operation.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str {
        "unnamed_subscriber"
    }

    async fn before_insert(&self, _model: &ModelRef) -> Result<()> {
        Ok(())
    }

    async fn after_insert(&self, _model: &ModelRef, _document: &Document) -> Result<()> {
        Ok(())
    }

    async fn before_update(&self, _class: &ClassId, _filter: &Document, _update: &Document) -> Result<()> {
        Ok(())
    }

    async fn after_update(&self, _class: &ClassId, _filter: &Document, _modified: u64) -> Result<()> {
        Ok(())
    }

    async fn before_delete(&self, _class: &ClassId, _filter: &Document) -> Result<()> {
        Ok(())
    }

    async fn after_delete(&self, _class: &ClassId, _filter: &Document, _deleted: u64) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct Subscription {
    classes: Option<HashSet<ClassId>>,
    subscriber: Arc<dyn EventSubscriber>,
}

impl Subscription {
    fn applies_to(&self, class: &ClassId) -> bool {
        self.classes.as_ref().is_none_or(|classes| classes.contains(class))
    }
}

/// Ordered list of subscribers. Hooks run in subscription order.
#[derive(Default)]
pub struct EventManager {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of every class.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscriptions.write().push(Subscription {
            classes: None,
            subscriber,
        });
    }

    /// Subscribe to events of the listed classes only.
    pub fn subscribe_for<I, C>(&self, classes: I, subscriber: Arc<dyn EventSubscriber>)
    where
        I: IntoIterator<Item = C>,
        C: Into<ClassId>,
    {
        self.subscriptions.write().push(Subscription {
            classes: Some(classes.into_iter().map(Into::into).collect()),
            subscriber,
        });
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    // Snapshot so no lock is held across subscriber awaits.
    fn matching(&self, class: &ClassId) -> Vec<Arc<dyn EventSubscriber>> {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.applies_to(class))
            .map(|s| s.subscriber.clone())
            .collect()
    }

    pub async fn before_insert(&self, model: &ModelRef) -> Result<()> {
        let class = model.class();
        for subscriber in self.matching(&class) {
            debug!(subscriber = subscriber.name(), class = %class, "before_insert");
            subscriber.before_insert(model).await?;
        }
        Ok(())
    }

    pub async fn after_insert(&self, model: &ModelRef, document: &Document) -> Result<()> {
        let class = model.class();
        for subscriber in self.matching(&class) {
            debug!(subscriber = subscriber.name(), class = %class, "after_insert");
            subscriber.after_insert(model, document).await?;
        }
        Ok(())
    }

    pub async fn before_update(&self, class: &ClassId, filter: &Document, update: &Document) -> Result<()> {
        for subscriber in self.matching(class) {
            subscriber.before_update(class, filter, update).await?;
        }
        Ok(())
    }

    pub async fn after_update(&self, class: &ClassId, filter: &Document, modified: u64) -> Result<()> {
        for subscriber in self.matching(class) {
            subscriber.after_update(class, filter, modified).await?;
        }
        Ok(())
    }

    pub async fn before_delete(&self, class: &ClassId, filter: &Document) -> Result<()> {
        for subscriber in self.matching(class) {
            subscriber.before_delete(class, filter).await?;
        }
        Ok(())
    }

    pub async fn after_delete(&self, class: &ClassId, filter: &Document, deleted: u64) -> Result<()> {
        for subscriber in self.matching(class) {
            subscriber.after_delete(class, filter, deleted).await?;
        }
        Ok(())
    }
}
