use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const NON_OPERATOR_KEYS: &[&str] = &["$id", "$ref", "$db"];

/// Operators whose payload is a modifier (a count, a flag, a pattern, a
/// direction) rather than a value of the field they sit under.
const VALUE_EXEMPT_OPERATORS: &[&str] = &[
    "$exists",
    "$type",
    "$size",
    "$regex",
    "$options",
    "$mod",
    "$pop",
    "$unset",
    "$currentDate",
    "$rename",
    "$slice",
    "$sort",
    "$position",
    "$bit",
    "$meta",
];

/// Controls how filter and update expressions are recognised and rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CastOptions {
    pub operator_sigil: char,
    /// Sigil-prefixed keys that are field names, not operators (DBRef parts).
    pub non_operator_keys: BTreeSet<String>,
    pub value_exempt_operators: BTreeSet<String>,
}

impl Default for CastOptions {
    fn default() -> Self {
        Self {
            operator_sigil: '$',
            non_operator_keys: NON_OPERATOR_KEYS.iter().map(|k| k.to_string()).collect(),
            value_exempt_operators: VALUE_EXEMPT_OPERATORS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl CastOptions {
    /// Exempt an additional operator from value casting
    pub fn exempt_operator(mut self, operator: impl Into<String>) -> Self {
        self.value_exempt_operators.insert(operator.into());
        self
    }

    /// Treat an additional sigil-prefixed key as a plain field
    pub fn non_operator_key(mut self, key: impl Into<String>) -> Self {
        self.non_operator_keys.insert(key.into());
        self
    }

    pub fn is_operator(&self, key: &str) -> bool {
        key.starts_with(self.operator_sigil) && !self.non_operator_keys.contains(key)
    }

    pub fn is_value_exempt(&self, operator: &str) -> bool {
        self.value_exempt_operators.contains(operator)
    }

    /// `$`, `$[]` and `$[ident]` array placeholders inside a field path.
    pub fn is_positional(&self, segment: &str) -> bool {
        let Some(rest) = segment.strip_prefix(self.operator_sigil) else {
            return false;
        };
        rest.is_empty() || (rest.starts_with('[') && rest.ends_with(']'))
    }
}
