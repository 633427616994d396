// ============================================================================
// RustODM Library
// ============================================================================

//! Object-document mapper.
//!
//! Classes are registered declaratively ([`MetadataRegistry`]), validated
//! once into a [`MetadataGraph`], and mapped through routines compiled per
//! class on first use. Filters and updates are rewritten to persisted field
//! names and encodings by the expression caster.
//!
//! ```
//! use rustodm::{ClassRegistration, DocumentManager, FieldDeclaration, MapperConfig, MetadataRegistry};
//! use rustodm::core::props_from_json;
//! use serde_json::json;
//!
//! # fn main() -> rustodm::Result<()> {
//! let registry = MetadataRegistry::new().with(
//!     ClassRegistration::document("User", "users")
//!         .field(FieldDeclaration::identifier("id", "stringId"))
//!         .field(FieldDeclaration::field("name")),
//! )?;
//! let manager = DocumentManager::new(&registry, MapperConfig::default())?;
//! let users = manager.document("User")?;
//!
//! let user = users.init(&props_from_json(json!({ "name": "John" })))?.unwrap();
//! let doc = users.to_persisted(&user)?.unwrap();
//! assert!(doc.contains_key("_id"));
//! # Ok(())
//! # }
//! ```

pub mod cast;
pub mod config;
pub mod core;
pub(crate) mod hydration;
pub mod manager;
pub mod metadata;
pub mod repository;
pub mod types;

pub use cast::CastOptions;
pub use config::{DiscriminatorPolicy, MapperConfig};
pub use core::{
    ClassId, Direction, Document, ModelObject, ModelRef, ObjectId, OdmError, Property, Props,
    Result, Value,
};
pub use manager::{DocumentManager, DocumentMapper};
pub use metadata::{
    ClassRegistration, DiscriminatorDeclaration, DocumentMetadata, FieldDeclaration,
    FieldMetadata, MetadataGraph, MetadataId, MetadataRegistry, SchemaConfig,
};
pub use repository::{CallOptions, CollectionStore, EventManager, EventSubscriber, Repository, Session};
pub use types::{Type, TypeRegistry};
