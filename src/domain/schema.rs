//! Declarative tool input schemas and the validation stage run before handlers
//!
//! Schemas are plain static data so the same value drives both the advertised
//! `inputSchema` in `tools/list` and argument validation in `tools/call`.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    /// Array whose items are objects matching the nested schema.
    ArrayOf(&'static InputSchema),
}

#[derive(Debug, Clone, Copy)]
pub struct Property {
    pub name: &'static str,
    pub kind: SchemaType,
    pub description: &'static str,
    pub allowed: &'static [&'static str],
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl Property {
    pub const fn new(name: &'static str, kind: SchemaType, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            allowed: &[],
            minimum: None,
            maximum: None,
        }
    }

    pub const fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    pub const fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InputSchema {
    pub properties: &'static [Property],
    pub required: &'static [&'static str],
    /// Groups of which exactly one member must be present.
    pub exactly_one_of: &'static [&'static [&'static str]],
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("arguments must be a JSON object")]
    NotAnObject,
    #[error("missing required field `{field}`")]
    MissingField { field: String },
    #[error("field `{field}` must be of type {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
    #[error("field `{field}` must be one of: {}", .allowed.join(", "))]
    NotAllowed {
        field: String,
        allowed: &'static [&'static str],
    },
    #[error("field `{field}` is out of range [{}, {}]", fmt_bound(.minimum), fmt_bound(.maximum))]
    OutOfRange {
        field: String,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    #[error("exactly one of {} must be provided", .fields.join(", "))]
    ExactlyOneOf { fields: &'static [&'static str] },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAnObject => "invalid_arguments",
            Self::MissingField { .. } => "missing_field",
            Self::WrongType { .. } => "invalid_type",
            Self::NotAllowed { .. } => "invalid_enum_value",
            Self::OutOfRange { .. } => "out_of_range",
            Self::ExactlyOneOf { .. } => "exactly_one_of",
        }
    }
}

fn fmt_bound(bound: &Option<f64>) -> String {
    bound.map_or_else(|| "unbounded".to_string(), |value| value.to_string())
}

impl SchemaType {
    fn type_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::ArrayOf(_) => "array",
        }
    }
}

impl InputSchema {
    /// Checks `arguments` and hands back the object for typed deserialization.
    pub fn validate(&self, arguments: Value) -> Result<Map<String, Value>, ValidationError> {
        let Value::Object(object) = arguments else {
            return Err(ValidationError::NotAnObject);
        };

        self.validate_object(&object, "")?;
        Ok(object)
    }

    fn validate_object(&self, object: &Map<String, Value>, path: &str) -> Result<(), ValidationError> {
        for field in self.required {
            if is_absent(object.get(*field)) {
                return Err(ValidationError::MissingField {
                    field: join_path(path, field),
                });
            }
        }

        for group in self.exactly_one_of {
            let present = group
                .iter()
                .filter(|field| !is_absent(object.get(**field)))
                .count();
            if present != 1 {
                return Err(ValidationError::ExactlyOneOf { fields: *group });
            }
        }

        for property in self.properties {
            let Some(value) = object.get(property.name).filter(|value| !value.is_null()) else {
                continue;
            };
            property.validate_value(value, &join_path(path, property.name))?;
        }

        Ok(())
    }

    /// Renders the JSON Schema object advertised as a tool's `inputSchema`.
    ///
    /// Exactly-one-of groups are stated in the member descriptions.
    pub fn to_json(&self) -> Value {
        let properties = self
            .properties
            .iter()
            .map(|property| {
                let group = self
                    .exactly_one_of
                    .iter()
                    .find(|group| group.contains(&property.name));
                (property.name.to_string(), property.to_json(group.copied()))
            })
            .collect::<Map<String, Value>>();

        Value::Object(Map::from_iter([
            ("type".to_string(), json!("object")),
            ("properties".to_string(), Value::Object(properties)),
            ("required".to_string(), json!(self.required)),
        ]))
    }
}

impl Property {
    fn validate_value(&self, value: &Value, field: &str) -> Result<(), ValidationError> {
        let wrong_type = || ValidationError::WrongType {
            field: field.to_string(),
            expected: self.kind.type_name(),
        };

        match self.kind {
            SchemaType::String => {
                let text = value.as_str().ok_or_else(wrong_type)?;
                if !self.allowed.is_empty() && !self.allowed.contains(&text) {
                    return Err(ValidationError::NotAllowed {
                        field: field.to_string(),
                        allowed: self.allowed,
                    });
                }
            }
            SchemaType::Number => {
                let number = value.as_f64().ok_or_else(wrong_type)?;
                self.check_range(number, field)?;
            }
            SchemaType::Integer => {
                let number = value
                    .as_i64()
                    .map(|signed| signed as f64)
                    .or_else(|| value.as_u64().map(|unsigned| unsigned as f64))
                    .ok_or_else(wrong_type)?;
                self.check_range(number, field)?;
            }
            SchemaType::Boolean => {
                value.as_bool().ok_or_else(wrong_type)?;
            }
            SchemaType::Object => {
                value.as_object().ok_or_else(wrong_type)?;
            }
            SchemaType::ArrayOf(item_schema) => {
                let items = value.as_array().ok_or_else(wrong_type)?;
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{field}[{index}]");
                    let object = item.as_object().ok_or_else(|| ValidationError::WrongType {
                        field: item_path.clone(),
                        expected: "object",
                    })?;
                    item_schema.validate_object(object, &item_path)?;
                }
            }
        }

        Ok(())
    }

    fn check_range(&self, number: f64, field: &str) -> Result<(), ValidationError> {
        let below = self.minimum.is_some_and(|minimum| number < minimum);
        let above = self.maximum.is_some_and(|maximum| number > maximum);
        if below || above {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                minimum: self.minimum,
                maximum: self.maximum,
            });
        }
        Ok(())
    }

    fn to_json(&self, exclusive_group: Option<&[&str]>) -> Value {
        let description = match exclusive_group {
            Some(group) => format!("{} (provide exactly one of: {})", self.description, group.join(", ")),
            None => self.description.to_string(),
        };
        let mut schema = Map::from_iter([
            ("type".to_string(), json!(self.kind.type_name())),
            ("description".to_string(), json!(description)),
        ]);
        if !self.allowed.is_empty() {
            schema.insert("enum".to_string(), json!(self.allowed));
        }
        if let Some(minimum) = self.minimum {
            schema.insert("minimum".to_string(), json!(minimum));
        }
        if let Some(maximum) = self.maximum {
            schema.insert("maximum".to_string(), json!(maximum));
        }
        if let SchemaType::ArrayOf(item_schema) = self.kind {
            schema.insert("items".to_string(), item_schema.to_json());
        }
        Value::Object(schema)
    }
}

/// Null and empty strings count as "not provided".
fn is_absent(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

fn join_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    static ITEM: InputSchema = InputSchema {
        properties: &[Property::new("level", SchemaType::String, "Level").one_of(&["LOW", "HIGH"])],
        required: &["level"],
        exactly_one_of: &[],
    };

    static SCHEMA: InputSchema = InputSchema {
        properties: &[
            Property::new("prompt", SchemaType::String, "Prompt"),
            Property::new("temperature", SchemaType::Number, "Temperature")
                .range(Some(0.0), Some(2.0)),
            Property::new("topK", SchemaType::Integer, "Top K").range(Some(1.0), None),
            Property::new("levels", SchemaType::ArrayOf(&ITEM), "Levels"),
            Property::new("left", SchemaType::String, "Left"),
            Property::new("right", SchemaType::String, "Right"),
        ],
        required: &["prompt"],
        exactly_one_of: &[&["left", "right"]],
    };

    #[test]
    fn accepts_valid_arguments() {
        let object = SCHEMA
            .validate(json!({
                "prompt": "hi",
                "temperature": 0.5,
                "topK": 3,
                "levels": [{ "level": "LOW" }],
                "left": "x",
                "extra": true
            }))
            .expect("valid arguments");

        assert_eq!(object["prompt"], "hi");
    }

    #[test]
    fn rejects_non_object_arguments() {
        let err = SCHEMA.validate(json!(["prompt"])).expect_err("array is invalid");
        assert_eq!(err.code(), "invalid_arguments");
    }

    #[test]
    fn rejects_missing_and_blank_required_fields() {
        let missing = SCHEMA.validate(json!({ "left": "x" })).expect_err("missing");
        let blank = SCHEMA
            .validate(json!({ "prompt": "  ", "left": "x" }))
            .expect_err("blank");

        assert_eq!(
            missing,
            ValidationError::MissingField {
                field: "prompt".to_string()
            }
        );
        assert_eq!(blank.code(), "missing_field");
    }

    #[test]
    fn enforces_exactly_one_of_groups() {
        let neither = SCHEMA.validate(json!({ "prompt": "p" })).expect_err("neither");
        let both = SCHEMA
            .validate(json!({ "prompt": "p", "left": "a", "right": "b" }))
            .expect_err("both");

        assert_eq!(neither.code(), "exactly_one_of");
        assert_eq!(both.to_string(), "exactly one of left, right must be provided");
    }

    #[test]
    fn enforces_types_ranges_and_nested_enums() {
        let wrong_type = SCHEMA
            .validate(json!({ "prompt": "p", "left": "a", "temperature": "hot" }))
            .expect_err("wrong type");
        let out_of_range = SCHEMA
            .validate(json!({ "prompt": "p", "left": "a", "temperature": 2.5 }))
            .expect_err("out of range");
        let fractional_integer = SCHEMA
            .validate(json!({ "prompt": "p", "left": "a", "topK": 1.5 }))
            .expect_err("fractional integer");
        let bad_enum = SCHEMA
            .validate(json!({ "prompt": "p", "left": "a", "levels": [{ "level": "MAX" }] }))
            .expect_err("bad enum");

        assert_eq!(wrong_type.code(), "invalid_type");
        assert_eq!(out_of_range.code(), "out_of_range");
        assert_eq!(fractional_integer.code(), "invalid_type");
        assert_eq!(
            bad_enum,
            ValidationError::NotAllowed {
                field: "levels[0].level".to_string(),
                allowed: &["LOW", "HIGH"],
            }
        );
    }

    #[test]
    fn large_unsigned_integers_are_compared_without_wrapping() {
        let accepted = SCHEMA.validate(json!({ "prompt": "p", "left": "a", "topK": u64::MAX }));

        assert!(accepted.is_ok(), "{accepted:?}");
    }

    #[test]
    fn renders_json_schema() {
        let rendered = SCHEMA.to_json();

        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!(["prompt"]));
        assert_eq!(rendered["properties"]["temperature"]["maximum"], json!(2.0));
        assert_eq!(
            rendered["properties"]["levels"]["items"]["properties"]["level"]["enum"],
            json!(["LOW", "HIGH"])
        );
        assert_eq!(
            rendered["properties"]["left"]["description"],
            "Left (provide exactly one of: left, right)"
        );
        assert_eq!(rendered["properties"]["prompt"]["description"], "Prompt");
        assert!(rendered.get("oneOf").is_none());
    }
}
