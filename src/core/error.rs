use std::fmt;
use thiserror::Error;

/// Which side of a conversion rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Model value being encoded for storage.
    ToPersisted,
    /// Stored value being decoded into the model.
    ToModel,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToPersisted => write!(f, "model -> persisted"),
            Self::ToModel => write!(f, "persisted -> model"),
        }
    }
}

#[derive(Error, Debug)]
pub enum OdmError {
    #[error("Configuration error in '{class}': {reason}")]
    Configuration { class: String, reason: String },

    #[error("Invalid value for type '{type_name}' ({direction}): {value}")]
    InvalidValue {
        type_name: String,
        value: String,
        direction: Direction,
    },

    #[error("Class '{0}' is not registered")]
    UnknownClass(String),

    #[error("Discriminator of '{class}' has no variant for {value}")]
    UnmappedDiscriminator { class: String, value: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OdmError {
    pub fn configuration(class: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Configuration {
            class: class.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value(
        type_name: impl Into<String>,
        value: &impl fmt::Display,
        direction: Direction,
    ) -> Self {
        Self::InvalidValue {
            type_name: type_name.into(),
            value: value.to_string(),
            direction,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_invalid_value(&self) -> bool {
        matches!(self, Self::InvalidValue { .. })
    }
}

pub type Result<T> = std::result::Result<T, OdmError>;
