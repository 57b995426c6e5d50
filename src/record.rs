//! Schemaless records whose accessors come from a strategy at runtime.

use crate::accessor::EntityAccessors;
use crate::core::Result;
use crate::generator::Generator;
use crate::strategy::KeyStrategy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object with an optional `id` key member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl JsonRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Renders a field as a key part: strings unquoted, null or missing
    /// as empty, anything else as compact JSON.
    pub fn render(&self, name: &str) -> String {
        match self.fields.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(value)) => value.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Registers `id` as the key member and every property named by
    /// `strategy` as a field.
    pub fn accessors(entity: &str, strategy: &KeyStrategy) -> EntityAccessors<JsonRecord> {
        let mut accessors = EntityAccessors::named(entity).key_field(
            "id",
            strategy.clone(),
            |record: &JsonRecord| record.id.as_deref(),
            |record: &mut JsonRecord, key: String| record.id = Some(key),
        );
        let mut seen: Vec<&str> = Vec::new();
        for name in strategy.property_names() {
            if name == "id" || seen.contains(&name) {
                continue;
            }
            seen.push(name);
            let field = name.to_string();
            accessors = accessors.field(name, move |record: &JsonRecord| record.render(&field));
        }
        accessors
    }

    pub fn generator(entity: &str, strategy: &KeyStrategy) -> Result<Generator<JsonRecord>> {
        Generator::from_accessors(&Self::accessors(entity, strategy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KeyError;
    use crate::strategy::KeySegment;

    #[test]
    fn renders_json_values_as_key_parts() {
        let record = JsonRecord::new()
            .with("name", "Ada")
            .with("age", 36)
            .with("nick", Value::Null);
        assert_eq!(record.render("name"), "Ada");
        assert_eq!(record.render("age"), "36");
        assert_eq!(record.render("nick"), "");
        assert_eq!(record.render("missing"), "");
    }

    #[test]
    fn keys_records_from_runtime_strategy() {
        let strategy = KeyStrategy::from_properties(["country", "city"]).separator("/");
        let generator = JsonRecord::generator("place", &strategy).unwrap();
        let mut record: JsonRecord =
            serde_json::from_str(r#"{ "country": "NL", "city": "Delft" }"#).unwrap();

        assert!(generator.assign(&mut record));
        assert_eq!(record.id.as_deref(), Some("NL/Delft"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "NL/Delft");
    }

    #[test]
    fn existing_ids_are_kept() {
        let strategy = KeyStrategy::new([KeySegment::Random]);
        let generator = JsonRecord::generator("blob", &strategy).unwrap();
        let mut record: JsonRecord = serde_json::from_str(r#"{ "id": "fixed" }"#).unwrap();
        assert!(!generator.assign(&mut record));
        assert_eq!(record.id.as_deref(), Some("fixed"));
    }

    #[test]
    fn strategy_errors_surface() {
        let strategy = KeyStrategy::new([KeySegment::Property]);
        assert!(matches!(
            JsonRecord::generator("broken", &strategy),
            Err(KeyError::ConfigurationError(_))
        ));
    }
}
