//! Extraction prompts and response shaping.

use serde_json::Value;
use tracing::warn;

use orgscout_schema::{FieldKind, FieldSpec, ItemShape};
use orgscout_shared::{Item, Result, ScoutError};

pub(crate) const SYSTEM_PROMPT: &str = "You extract factual information about an organization \
from the text of a web page. Only report what the text supports.";

/// Build the user prompt for one field and one page of text.
pub fn build_prompt(field: &FieldSpec, text: &str) -> String {
    let instructions = match &field.kind {
        FieldKind::ScalarText => format!(
            "Summarize what the text says about \"{}\" in 1-3 clear sentences.\n\
             Return a simple string.",
            field.name
        ),
        FieldKind::ListOfRecords(shape) => format!(
            "Extract a list of \"{}\" entries from the text.\n\
             Return a JSON object like: {{\"items\": [{}]}}\n\
             {}",
            field.name,
            example_item(shape),
            required_note(shape)
        ),
    };

    let extra = field
        .prompt
        .as_deref()
        .map(|p| format!("\n{}", p.trim()))
        .unwrap_or_default();

    format!(
        "Extract information for field \"{}\" from the following page text.\n\n\
         {instructions}{extra}\n\nText:\n{text}",
        field.name
    )
}

fn example_item(shape: &ItemShape) -> String {
    let attrs: Vec<String> = shape
        .attrs()
        .map(|(name, _)| format!("\"{name}\": \"...\""))
        .collect();
    format!("{{ {} }}", attrs.join(", "))
}

fn required_note(shape: &ItemShape) -> String {
    let required: Vec<&str> = shape.required_attrs().collect();
    if required.is_empty() {
        "Every attribute may be omitted when the text does not mention it.".to_string()
    } else {
        format!(
            "Every item must include {}; other attributes may be omitted.",
            required.join(", ")
        )
    }
}

/// Remove a surrounding Markdown code fence, if any.
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Coerce a backend response into items matching `shape`.
///
/// Accepts `{"items": [...]}` or a bare array. Non-object items and items
/// missing a required attribute are dropped; unknown attributes are ignored.
pub fn coerce_items(field: &str, shape: &ItemShape, value: Value) -> Result<Vec<Item>> {
    let raw_items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ScoutError::Extraction(format!(
                    "{field}: \"items\" is not an array (got {other})"
                )));
            }
        },
        other => {
            return Err(ScoutError::Extraction(format!(
                "{field}: expected an object with \"items\", got {other}"
            )));
        }
    };

    let mut items = Vec::with_capacity(raw_items.len());
    for raw in raw_items {
        let Value::Object(obj) = raw else {
            warn!(field, "dropping non-object list item");
            continue;
        };

        let mut item = Item::new();
        let mut complete = true;
        for (attr, kind) in shape.attrs() {
            let text = match obj.get(attr) {
                Some(Value::String(s)) => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(Value::Bool(b)) => Some(b.to_string()),
                _ => None,
            }
            .filter(|s| !s.is_empty());

            match text {
                Some(text) => {
                    item.insert(attr.to_string(), text);
                }
                None if kind.is_optional() => {}
                None => {
                    complete = false;
                    break;
                }
            }
        }

        if complete {
            items.push(item);
        } else {
            warn!(field, "dropping list item missing a required attribute");
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgscout_schema::{DomainSet, Schema};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::parse(
            r#"{
                "events": {"type": "array", "items": {"title": "string", "date": "string?"}},
                "admissionsFocus": {"type": "string", "prompt": "Mention test-optional policies."}
            }"#,
            DomainSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn list_prompt_describes_shape() {
        let schema = schema();
        let prompt = build_prompt(schema.field("events").unwrap(), "Open House Oct 1");
        assert!(prompt.contains("Extract information for field \"events\""));
        assert!(prompt.contains("{\"items\": [{ \"date\": \"...\", \"title\": \"...\" }]}"));
        assert!(prompt.contains("must include title"));
        assert!(prompt.ends_with("Text:\nOpen House Oct 1"));
    }

    #[test]
    fn scalar_prompt_appends_field_prompt() {
        let schema = schema();
        let prompt = build_prompt(schema.field("admissionsFocus").unwrap(), "text");
        assert!(prompt.contains("Return a simple string."));
        assert!(prompt.contains("Mention test-optional policies."));
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n{\"items\": []}\n```"), "{\"items\": []}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn coerces_items_to_shape() {
        let schema = schema();
        let shape = schema.field("events").unwrap().item_shape().unwrap();
        let items = coerce_items(
            "events",
            shape,
            json!({"items": [
                {"title": " Open House ", "date": "2024-10-01", "venue": "Hall"},
                {"title": "Career Fair", "date": null},
                {"date": "2024-11-01"},
                {"title": ""},
                "not an object"
            ]}),
        )
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["title"], "Open House");
        assert_eq!(items[0]["date"], "2024-10-01");
        assert!(!items[0].contains_key("venue"));
        assert!(!items[1].contains_key("date"));
    }

    #[test]
    fn accepts_bare_array_and_rejects_scalars() {
        let schema = schema();
        let shape = schema.field("events").unwrap().item_shape().unwrap();
        let items = coerce_items("events", shape, json!([{"title": "Gala"}])).unwrap();
        assert_eq!(items.len(), 1);

        assert!(coerce_items("events", shape, json!("nope")).is_err());
        assert!(coerce_items("events", shape, json!({"items": "nope"})).is_err());
        assert!(coerce_items("events", shape, json!({})).unwrap().is_empty());
    }
}
