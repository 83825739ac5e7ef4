//! Core domain types: entities, field values, and profile records.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Record keys that every partial and canonical record carries.
pub const IDENTITY_FIELDS: [&str; 4] = ["id", "name", "website", "scrapedAt"];

/// Returns `true` if `name` is one of the [`IDENTITY_FIELDS`].
pub fn is_identity_field(name: &str) -> bool {
    IDENTITY_FIELDS.contains(&name)
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

static KEY_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-]+").expect("valid separator regex"));

static KEY_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_]").expect("valid unsafe-char regex"));

/// One organization being profiled, as listed in the entity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Free-text name, also used to build search queries.
    pub name: String,
    /// Homepage URL.
    pub url: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Filesystem-safe key used to name this entity's workspace files.
    pub fn key(&self) -> String {
        entity_key(&self.name)
    }
}

/// Sanitize an entity name into a workspace file key.
///
/// Keys only contain `[a-z0-9_]`, so `<key>-` never prefixes another entity's files.
pub fn entity_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let joined = KEY_SEPARATORS.replace_all(&lowered, "_");
    let key = KEY_UNSAFE.replace_all(&joined, "").into_owned();
    if key.is_empty() { "entity".to_string() } else { key }
}

/// Parse the entity list document (an ordered JSON array of `{name, url}`).
pub fn parse_entities(json: &str) -> serde_json::Result<Vec<Entity>> {
    serde_json::from_str(json)
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// One list-of-records item: sub-attribute name → text.
///
/// Optional attributes that are absent are simply not in the map.
pub type Item = BTreeMap<String, String>;

/// The value of one schema field inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Value of a scalar-text field.
    Text(String),
    /// Value of a list-of-records field.
    Items(Vec<Item>),
}

impl FieldValue {
    /// Short kind label for log and error messages.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Items(_) => "items",
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A profile record for one entity.
///
/// The same shape serves as the raw output of one crawl pass (a partial
/// record) and as the merged, validated result (the canonical record).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique record id generated on the homepage pass.
    #[serde(default)]
    pub id: String,
    /// Display name, from the homepage title.
    #[serde(default)]
    pub name: String,
    /// Homepage URL.
    #[serde(default)]
    pub website: String,
    /// RFC 3339 timestamp of the crawl pass.
    #[serde(
        rename = "scrapedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub scraped_at: Option<String>,
    /// Schema fields, keyed by field name.
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Value of an identity field by its record key.
    pub fn identity(&self, key: &str) -> Option<&str> {
        let value = match key {
            "id" => self.id.as_str(),
            "name" => self.name.as_str(),
            "website" => self.website.as_str(),
            "scrapedAt" => self.scraped_at.as_deref()?,
            _ => return None,
        };
        Some(value)
    }

    /// Pretty JSON with a trailing newline, the on-disk form of a record.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }
}
