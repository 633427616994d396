//! Field and document metadata.
//!
//! - `registration.rs` - declarative class/field registrations and JSON loading
//! - `document.rs` - the immutable metadata graph
//! - `builder.rs` - validation and graph construction

mod builder;
mod document;
mod registration;

pub use builder::MetadataBuilder;
pub use document::{
    DiscriminatorMetadata, DocumentMetadata, FieldMetadata, MetadataGraph, MetadataId,
};
pub use registration::{
    ClassRegistration, DiscriminatorDeclaration, FieldDeclaration, IDENTIFIER_FIELD,
    MetadataRegistry, SchemaConfig,
};
