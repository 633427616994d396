pub mod error;
pub mod model;
pub mod object_id;
pub mod value;

pub use error::{Direction, OdmError, Result};
pub use model::{ClassId, ModelObject, ModelRef, Property, Props, props_from_json};
pub use object_id::ObjectId;
pub use value::{Document, Value, document_from_json};
