use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Type;
use crate::core::{Direction, ObjectId, OdmError, Result, Value};

/// Native identifier on both sides.
#[derive(Debug, Default)]
pub struct ObjectIdType;

impl Type for ObjectIdType {
    fn name(&self) -> &'static str {
        "objectId"
    }

    fn is_valid_model_value(&self, value: &Value) -> bool {
        matches!(value, Value::ObjectId(_))
    }

    fn is_valid_persisted_value(&self, value: &Value) -> bool {
        matches!(value, Value::ObjectId(_))
    }

    fn convert_to_persisted(&self, value: &Value) -> Value {
        value.clone()
    }

    fn convert_to_model(&self, value: &Value) -> Value {
        value.clone()
    }

    fn can_create_model_value(&self) -> bool {
        true
    }

    fn create_model_value(&self, _seed: Option<&Value>) -> Option<Value> {
        Some(Value::ObjectId(ObjectId::new()))
    }
}

/// Hex string in the model, 12-byte identifier in storage.
#[derive(Debug, Default)]
pub struct StringIdType;

impl Type for StringIdType {
    fn name(&self) -> &'static str {
        "stringId"
    }

    fn is_valid_model_value(&self, value: &Value) -> bool {
        value.as_str().is_some_and(is_lowercase_hex_id)
    }

    fn is_valid_persisted_value(&self, value: &Value) -> bool {
        matches!(value, Value::ObjectId(_))
    }

    fn convert_to_persisted(&self, value: &Value) -> Value {
        match value.as_str().map(ObjectId::parse_str) {
            Some(Ok(id)) => Value::ObjectId(id),
            _ => value.clone(),
        }
    }

    fn convert_to_model(&self, value: &Value) -> Value {
        match value {
            Value::ObjectId(id) => Value::Text(id.to_hex()),
            other => other.clone(),
        }
    }

    fn can_create_model_value(&self) -> bool {
        true
    }

    fn create_model_value(&self, _seed: Option<&Value>) -> Option<Value> {
        Some(Value::Text(ObjectId::new().to_hex()))
    }

    fn to_persisted_expression(&self, value: &Value) -> Result<Value> {
        match value.as_str().map(ObjectId::parse_str) {
            Some(Ok(id)) => Ok(Value::ObjectId(id)),
            _ => self.to_persisted(value),
        }
    }
}

fn is_lowercase_hex_id(s: &str) -> bool {
    ObjectId::is_valid_hex(s) && !s.bytes().any(|b| b.is_ascii_uppercase())
}

/// Textual UUID in the model, binary UUID in storage.
#[derive(Debug, Default)]
pub struct UuidType;

impl Type for UuidType {
    fn name(&self) -> &'static str {
        "uuid"
    }

    /// Only the lowercase hyphenated form, which is what decoding yields.
    fn is_valid_model_value(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|s| {
            s.len() == HYPHENATED_LEN
                && !s.bytes().any(|b| b.is_ascii_uppercase())
                && Uuid::parse_str(s).is_ok()
        })
    }

    fn is_valid_persisted_value(&self, value: &Value) -> bool {
        matches!(value, Value::Uuid(_))
    }

    fn convert_to_persisted(&self, value: &Value) -> Value {
        match value.as_str().map(Uuid::parse_str) {
            Some(Ok(uuid)) => Value::Uuid(uuid),
            _ => value.clone(),
        }
    }

    fn convert_to_model(&self, value: &Value) -> Value {
        match value {
            Value::Uuid(uuid) => Value::Text(uuid.hyphenated().to_string()),
            other => other.clone(),
        }
    }

    fn can_create_model_value(&self) -> bool {
        true
    }

    fn create_model_value(&self, _seed: Option<&Value>) -> Option<Value> {
        Some(Value::Text(Uuid::new_v4().hyphenated().to_string()))
    }

    fn to_persisted_expression(&self, value: &Value) -> Result<Value> {
        match value.as_str().map(Uuid::parse_str) {
            Some(Ok(uuid)) => Ok(Value::Uuid(uuid)),
            _ => self.to_persisted(value),
        }
    }
}

const HYPHENATED_LEN: usize = 36;

macro_rules! scalar_type {
    ($(#[$doc:meta])* $name:ident, $type_name:literal, $pattern:pat) => {
        $(#[$doc])*
        #[derive(Debug, Default)]
        pub struct $name;

        impl Type for $name {
            fn name(&self) -> &'static str {
                $type_name
            }

            fn is_valid_model_value(&self, value: &Value) -> bool {
                matches!(value, $pattern)
            }

            fn is_valid_persisted_value(&self, value: &Value) -> bool {
                matches!(value, $pattern)
            }

            fn convert_to_persisted(&self, value: &Value) -> Value {
                value.clone()
            }

            fn convert_to_model(&self, value: &Value) -> Value {
                value.clone()
            }
        }
    };
}

scalar_type!(StringType, "string", Value::Text(_));
scalar_type!(IntegerType, "integer", Value::Integer(_));
scalar_type!(FloatType, "float", Value::Float(_));
scalar_type!(BooleanType, "boolean", Value::Boolean(_));

/// Timestamp on both sides. Expressions may also carry RFC 3339 strings.
#[derive(Debug, Default)]
pub struct DateType;

impl DateType {
    fn parse(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl Type for DateType {
    fn name(&self) -> &'static str {
        "date"
    }

    fn is_valid_model_value(&self, value: &Value) -> bool {
        matches!(value, Value::Timestamp(_))
    }

    fn is_valid_persisted_value(&self, value: &Value) -> bool {
        matches!(value, Value::Timestamp(_))
    }

    fn convert_to_persisted(&self, value: &Value) -> Value {
        value.clone()
    }

    fn convert_to_model(&self, value: &Value) -> Value {
        value.clone()
    }

    fn to_persisted_expression(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Text(s) => Self::parse(s)
                .map(Value::Timestamp)
                .ok_or_else(|| OdmError::invalid_value(self.name(), value, Direction::ToPersisted)),
            other => self.to_persisted(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_encodes_to_object_id() {
        let ty = StringIdType;
        let persisted = ty
            .to_persisted(&Value::from("507f191e810c19729de860ea"))
            .unwrap();
        assert_eq!(
            persisted,
            Value::ObjectId(ObjectId::parse_str("507f191e810c19729de860ea").unwrap())
        );
        assert_eq!(
            ty.to_model(&persisted).unwrap(),
            Value::from("507f191e810c19729de860ea")
        );
        assert!(ty.to_persisted(&Value::from("not-an-id")).is_err());
        assert!(ty.to_model(&Value::from("507f191e810c19729de860ea")).is_err());
    }

    #[test]
    fn test_uuid_created_values_are_valid() {
        let ty = UuidType;
        let created = ty.create_model_value(None).unwrap();
        assert!(ty.is_valid_model_value(&created));
        assert!(matches!(ty.to_persisted(&created).unwrap(), Value::Uuid(_)));
    }

    #[test]
    fn test_date_text_only_in_expressions() {
        let ty = DateType;
        let text = Value::from("2024-03-01T10:00:00Z");
        assert!(!ty.is_valid_model_value(&text));
        assert!(ty.to_persisted(&text).is_err());
        assert!(matches!(
            ty.to_persisted_expression(&text).unwrap(),
            Value::Timestamp(_)
        ));
        assert!(ty.to_persisted_expression(&Value::from("yesterday")).is_err());
    }

    #[test]
    fn test_non_canonical_identifiers_are_not_model_values() {
        let upper = Value::from("507F191E810C19729DE860EA");
        assert!(!StringIdType.is_valid_model_value(&upper));
        assert_eq!(
            StringIdType.to_persisted_expression(&upper).unwrap(),
            Value::ObjectId(ObjectId::parse_str("507f191e810c19729de860ea").unwrap())
        );

        for form in [
            "67e5504410b1426f9247bb680e5fe0c8",
            "urn:uuid:67e55044-10b1-426f-9247-bb680e5fe0c8",
            "{67e55044-10b1-426f-9247-bb680e5fe0c8}",
            "67E55044-10B1-426F-9247-BB680E5FE0C8",
        ] {
            let value = Value::from(form);
            assert!(!UuidType.is_valid_model_value(&value), "{form}");
            assert!(matches!(
                UuidType.to_persisted_expression(&value).unwrap(),
                Value::Uuid(_)
            ));
        }
        assert!(UuidType.is_valid_model_value(&Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8")));
    }

    #[test]
    fn test_scalar_types_reject_other_kinds() {
        assert!(IntegerType.to_persisted(&Value::Float(1.5)).is_err());
        assert!(FloatType.to_persisted(&Value::Integer(1)).is_err());
        assert!(BooleanType.to_model(&Value::from("true")).is_err());
        assert_eq!(
            StringType.to_persisted(&Value::from("x")).unwrap(),
            Value::from("x")
        );
    }
}
