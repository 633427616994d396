use serde::{Deserialize, Serialize};

use crate::cast::CastOptions;
use crate::core::Result;

/// What hydration does when a discriminated document carries a tag with no
/// registered variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorPolicy {
    /// Yield no result.
    #[default]
    Permissive,
    /// Fail with [`OdmError::UnmappedDiscriminator`](crate::OdmError::UnmappedDiscriminator).
    Strict,
}

/// Mapper configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub discriminator_policy: DiscriminatorPolicy,
    pub cast: CastOptions,
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the discriminator miss policy
    pub fn discriminator_policy(mut self, policy: DiscriminatorPolicy) -> Self {
        self.discriminator_policy = policy;
        self
    }

    /// Set the expression cast options
    pub fn cast_options(mut self, options: CastOptions) -> Self {
        self.cast = options;
        self
    }

    /// Load from JSON; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
