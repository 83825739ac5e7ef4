//! Field-schema model for profile extraction.
//!
//! A schema document is a JSON object mapping each output field name to its
//! declaration:
//!
//! ```json
//! {
//!   "events": {
//!     "type": "array",
//!     "optional": true,
//!     "search": "events",
//!     "dedupeBy": "title+date",
//!     "avoid": ["eventbrite.com"],
//!     "items": { "title": "string", "date": "string?" }
//!   }
//! }
//! ```
//!
//! [`Schema::load`] turns it into typed [`FieldSpec`]s and resolves the global
//! avoid-list once, so every later stage reads an immutable value.

pub mod avoid;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use orgscout_shared::{Result, ScoutError, is_identity_field};

pub use avoid::{DomainSet, GlobalAvoidSource, SIDECAR_FILE_NAME};

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

/// Type of one list-item sub-attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// `"string"`: must be present.
    Text,
    /// `"string?"`: may be absent.
    OptionalText,
}

impl AttrKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "string" => Some(Self::Text),
            "string?" => Some(Self::OptionalText),
            _ => None,
        }
    }

    pub fn is_optional(self) -> bool {
        matches!(self, Self::OptionalText)
    }
}

/// Sub-attributes of a list-of-records field, keyed by attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemShape {
    attrs: BTreeMap<String, AttrKind>,
}

impl ItemShape {
    pub fn attrs(&self) -> impl Iterator<Item = (&str, AttrKind)> {
        self.attrs.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn attr(&self, name: &str) -> Option<AttrKind> {
        self.attrs.get(name).copied()
    }

    /// Names of the attributes every item must carry.
    pub fn required_attrs(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .iter()
            .filter(|(_, kind)| !kind.is_optional())
            .map(|(name, _)| name.as_str())
    }
}

/// Kind of a schema field. The item shape only exists for lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    ScalarText,
    ListOfRecords(ItemShape),
}

impl FieldKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ScalarText => "string",
            Self::ListOfRecords(_) => "array",
        }
    }
}

/// Sub-attributes whose case-insensitive values identify duplicate list items.
///
/// Declared as `"name"` or, for composite keys, `"title+date"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupeKey {
    attrs: Vec<String>,
}

impl DedupeKey {
    fn parse(raw: &str) -> Option<Self> {
        let attrs: Vec<String> = raw
            .split('+')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();
        if attrs.is_empty() { None } else { Some(Self { attrs }) }
    }

    pub fn attrs(&self) -> &[String] {
        &self.attrs
    }
}

impl std::fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.attrs.join("+"))
    }
}

// ---------------------------------------------------------------------------
// FieldSpec
// ---------------------------------------------------------------------------

/// One declared output field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub optional: bool,
    /// Keyword appended to the entity name to discover pages for this field.
    /// `None` means the field is never crawled on its own.
    pub search_keyword: Option<String>,
    pub dedupe_key: Option<DedupeKey>,
    /// Hosts banned for this field only.
    pub avoid_domains: DomainSet,
    /// Extra extraction instructions.
    pub prompt: Option<String>,
}

impl FieldSpec {
    pub fn item_shape(&self) -> Option<&ItemShape> {
        match &self.kind {
            FieldKind::ListOfRecords(shape) => Some(shape),
            FieldKind::ScalarText => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw document
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    dedupe_by: Option<String>,
    #[serde(default)]
    avoid: Vec<String>,
    #[serde(default)]
    items: Option<BTreeMap<String, String>>,
    #[serde(default)]
    prompt: Option<String>,
}

fn parse_field(name: &str, raw: RawField) -> Result<FieldSpec> {
    let kind = match (raw.kind.as_str(), raw.items) {
        ("string", None) => FieldKind::ScalarText,
        ("string", Some(_)) => {
            return Err(ScoutError::schema_parse(format!(
                "field \"{name}\" is a string but declares \"items\""
            )));
        }
        ("array", Some(items)) => {
            if items.is_empty() {
                return Err(ScoutError::schema_parse(format!(
                    "field \"{name}\" declares an empty \"items\" shape"
                )));
            }
            let mut attrs = BTreeMap::new();
            for (attr, ty) in items {
                let kind = AttrKind::parse(&ty).ok_or_else(|| {
                    ScoutError::schema_parse(format!(
                        "unsupported item type \"{ty}\" for key \"{attr}\" in field \"{name}\""
                    ))
                })?;
                attrs.insert(attr, kind);
            }
            FieldKind::ListOfRecords(ItemShape { attrs })
        }
        ("array", None) => {
            return Err(ScoutError::schema_parse(format!(
                "array field \"{name}\" is missing \"items\""
            )));
        }
        (other, _) => {
            return Err(ScoutError::schema_parse(format!(
                "unsupported field type \"{other}\" for field \"{name}\""
            )));
        }
    };

    if is_identity_field(name) && kind != FieldKind::ScalarText {
        return Err(ScoutError::schema_parse(format!(
            "identity field \"{name}\" must be a string"
        )));
    }

    let search_keyword = raw
        .search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if is_identity_field(name) && search_keyword.is_some() {
        return Err(ScoutError::schema_parse(format!(
            "identity field \"{name}\" is filled from the homepage and cannot declare \"search\""
        )));
    }

    let dedupe_key = match raw.dedupe_by.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(declared) => {
            let FieldKind::ListOfRecords(shape) = &kind else {
                return Err(ScoutError::schema_parse(format!(
                    "field \"{name}\" declares \"dedupeBy\" but is not an array"
                )));
            };
            let key = DedupeKey::parse(declared).ok_or_else(|| {
                ScoutError::schema_parse(format!("field \"{name}\" has an empty \"dedupeBy\""))
            })?;
            if let Some(missing) = key.attrs().iter().find(|a| shape.attr(a).is_none()) {
                return Err(ScoutError::schema_parse(format!(
                    "field \"{name}\" dedupes by \"{missing}\", which is not an item attribute"
                )));
            }
            Some(key)
        }
    };

    Ok(FieldSpec {
        name: name.to_string(),
        kind,
        optional: raw.optional,
        search_keyword,
        dedupe_key,
        avoid_domains: raw.avoid.iter().collect(),
        prompt: raw.prompt.filter(|p| !p.trim().is_empty()),
    })
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// The full field schema plus the global avoid-list. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
    global_avoid: DomainSet,
}

impl Schema {
    /// Load a schema from inline text or a file path (inline wins).
    ///
    /// The sidecar avoid-list is only consulted when the schema came from a file.
    pub fn load(
        inline: Option<&str>,
        path: Option<&Path>,
        avoid: &GlobalAvoidSource,
    ) -> Result<Self> {
        let (text, schema_path): (String, Option<PathBuf>) = match (inline, path) {
            (Some(text), _) => (text.to_string(), None),
            (None, Some(path)) => {
                let text = std::fs::read_to_string(path).map_err(|e| ScoutError::io(path, e))?;
                (text, Some(path.to_path_buf()))
            }
            (None, None) => {
                return Err(ScoutError::schema_parse(
                    "either inline schema text or a schema path is required",
                ));
            }
        };

        let global_avoid = avoid.resolve(schema_path.as_deref());
        let schema = Self::parse(&text, global_avoid)?;

        info!(
            fields = schema.fields.len(),
            searchable = schema.searchable_fields().count(),
            global_avoid = schema.global_avoid.len(),
            "schema loaded"
        );
        Ok(schema)
    }

    /// Parse schema text with an already-resolved global avoid-list.
    pub fn parse(text: &str, global_avoid: DomainSet) -> Result<Self> {
        let raw: BTreeMap<String, RawField> = serde_json::from_str(text)
            .map_err(|e| ScoutError::schema_parse(format!("malformed schema document: {e}")))?;

        let mut fields = BTreeMap::new();
        for (name, raw_field) in raw {
            let spec = parse_field(&name, raw_field)?;
            debug!(field = %name, kind = spec.kind.label(), "parsed field");
            fields.insert(name, spec);
        }

        Ok(Self {
            fields,
            global_avoid,
        })
    }

    /// All fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Fields that declare a search keyword.
    pub fn searchable_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values().filter(|f| f.search_keyword.is_some())
    }

    pub fn global_avoid(&self) -> &DomainSet {
        &self.global_avoid
    }

    /// Returns `true` if `url` is banned for `field` by the global or field avoid-list.
    pub fn is_avoided(&self, field: &FieldSpec, url: &str) -> bool {
        self.global_avoid.matches_url(url) || field.avoid_domains.matches_url(url)
    }
}
