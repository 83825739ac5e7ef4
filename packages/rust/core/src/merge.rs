//! Merge and validation: fold an entity's partial records into one canonical
//! record, deduplicate list fields, trim text, validate against the schema.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use orgscout_schema::{DedupeKey, FieldKind, FieldSpec, Schema};
use orgscout_shared::{FieldValue, Item, Record, Result, ScoutError, is_identity_field};

use crate::run::Run;

// ---------------------------------------------------------------------------
// Fold
// ---------------------------------------------------------------------------

/// Fold partial records in order.
///
/// Identity fields keep the first non-empty value. Text fields are
/// concatenated with a trailing space after each contribution. Lists are
/// concatenated. Values for fields the schema does not declare, and any
/// identity name found among the schema fields, are dropped.
pub fn fold_partials(
    partials: impl IntoIterator<Item = Record>,
    schema: &Schema,
) -> Result<Record> {
    let mut acc = Record::default();

    for partial in partials {
        keep_first(&mut acc.id, partial.id);
        keep_first(&mut acc.name, partial.name);
        keep_first(&mut acc.website, partial.website);
        if acc.scraped_at.as_deref().is_none_or(str::is_empty) {
            acc.scraped_at = partial.scraped_at.filter(|s| !s.is_empty());
        }

        for (name, value) in partial.fields {
            if is_identity_field(&name) {
                debug!(field = %name, "ignoring identity name among schema fields");
                continue;
            }
            let Some(field) = schema.field(&name) else {
                debug!(field = %name, "ignoring field not declared in schema");
                continue;
            };
            fold_value(&mut acc, field, value)?;
        }
    }

    Ok(acc)
}

fn keep_first(slot: &mut String, candidate: String) {
    if slot.is_empty() && !candidate.is_empty() {
        *slot = candidate;
    }
}

fn fold_value(acc: &mut Record, field: &FieldSpec, value: FieldValue) -> Result<()> {
    match (&field.kind, value) {
        (FieldKind::ScalarText, FieldValue::Text(text)) => {
            let slot = acc
                .fields
                .entry(field.name.clone())
                .or_insert_with(|| FieldValue::Text(String::new()));
            if let FieldValue::Text(existing) = slot {
                existing.push_str(&text);
                existing.push(' ');
            }
        }
        (FieldKind::ListOfRecords(_), FieldValue::Items(items)) => {
            let slot = acc
                .fields
                .entry(field.name.clone())
                .or_insert_with(|| FieldValue::Items(Vec::new()));
            if let FieldValue::Items(existing) = slot {
                existing.extend(items);
            }
        }
        (kind, value) => {
            return Err(ScoutError::validation(format!(
                "field \"{}\" is declared {} but a partial record holds {}",
                field.name,
                kind.label(),
                value.kind_label()
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Dedupe
// ---------------------------------------------------------------------------

/// Drop items whose dedupe-key values match an earlier item, ignoring case.
///
/// The first occurrence wins and survivors keep their relative order. A
/// missing attribute counts as an empty string.
pub fn dedupe_items(items: Vec<Item>, key: &DedupeKey) -> Vec<Item> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item_key(item, key)))
        .collect()
}

fn item_key(item: &Item, key: &DedupeKey) -> Vec<String> {
    key.attrs()
        .iter()
        .map(|attr| {
            item.get(attr)
                .map(|v| v.trim().to_lowercase())
                .unwrap_or_default()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Finalize and validate
// ---------------------------------------------------------------------------

/// Dedupe lists, trim text, and validate the folded record.
pub fn finalize(mut record: Record, schema: &Schema) -> Result<Record> {
    let names: Vec<String> = record.fields.keys().cloned().collect();
    for name in names {
        let Some(field) = schema.field(&name) else {
            continue;
        };
        let Some(value) = record.fields.remove(&name) else {
            continue;
        };
        match value {
            FieldValue::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    record.fields.insert(name, FieldValue::Text(trimmed.to_string()));
                }
            }
            FieldValue::Items(items) => {
                let before = items.len();
                let items = match &field.dedupe_key {
                    Some(key) => dedupe_items(items, key),
                    None => items,
                };
                if items.len() < before {
                    debug!(field = %name, dropped = before - items.len(), "duplicates removed");
                }
                record.fields.insert(name, FieldValue::Items(items));
            }
        }
    }

    record.id = record.id.trim().to_string();
    record.name = record.name.trim().to_string();
    record.website = record.website.trim().to_string();

    validate(&record, schema)?;
    Ok(record)
}

/// Check a record against the schema: every required field is present and
/// every value has its field's kind and item shape.
pub fn validate(record: &Record, schema: &Schema) -> Result<()> {
    if record.id.is_empty() {
        return Err(ScoutError::validation("record has no id"));
    }

    for field in schema.fields() {
        if is_identity_field(&field.name) {
            let present = record.identity(&field.name).is_some_and(|v| !v.is_empty());
            if !present && !field.optional {
                return Err(ScoutError::validation(format!(
                    "required field \"{}\" is missing",
                    field.name
                )));
            }
            continue;
        }

        match (record.fields.get(&field.name), &field.kind) {
            (None, _) if field.optional => {}
            (None, _) => {
                return Err(ScoutError::validation(format!(
                    "required field \"{}\" is missing",
                    field.name
                )));
            }
            (Some(FieldValue::Text(_)), FieldKind::ScalarText) => {}
            (Some(FieldValue::Items(items)), FieldKind::ListOfRecords(shape)) => {
                for (index, item) in items.iter().enumerate() {
                    if let Some(attr) = shape
                        .required_attrs()
                        .find(|a| item.get(*a).is_none_or(|v| v.trim().is_empty()))
                    {
                        return Err(ScoutError::validation(format!(
                            "item {index} of \"{}\" is missing required attribute \"{attr}\"",
                            field.name
                        )));
                    }
                    if let Some(unknown) = item.keys().find(|k| shape.attr(k).is_none()) {
                        return Err(ScoutError::validation(format!(
                            "item {index} of \"{}\" has undeclared attribute \"{unknown}\"",
                            field.name
                        )));
                    }
                }
            }
            (Some(value), kind) => {
                return Err(ScoutError::validation(format!(
                    "field \"{}\" must be {}, found {}",
                    field.name,
                    kind.label(),
                    value.kind_label()
                )));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge every partial record of `entity_key` in `run` into the canonical record.
///
/// On success the canonical file is written and the partials are deleted.
/// On failure nothing is written and the partials stay in place.
#[instrument(skip_all, fields(entity = %entity_key, run_id = %run.id()))]
pub fn merge_entity(entity_key: &str, run: &Run, schema: &Schema) -> Result<Record> {
    let paths = run.partial_paths(entity_key)?;
    if paths.is_empty() {
        return Err(ScoutError::validation(format!(
            "no partial records for \"{entity_key}\" in {}",
            run.dir().display()
        )));
    }

    let mut partials = Vec::with_capacity(paths.len());
    for path in &paths {
        let text = std::fs::read_to_string(path).map_err(|e| ScoutError::io(path, e))?;
        let record: Record = serde_json::from_str(&text).map_err(|e| ScoutError::json(path, e))?;
        partials.push(record);
    }

    let merged = finalize(fold_partials(partials, schema)?, schema)?;

    let canonical = run.canonical_path(entity_key);
    let json = merged
        .to_pretty_json()
        .map_err(|e| ScoutError::json(&canonical, e))?;
    std::fs::write(&canonical, json).map_err(|e| ScoutError::io(&canonical, e))?;

    for path in &paths {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to delete partial record");
        }
    }

    info!(
        partials = paths.len(),
        fields = merged.fields.len(),
        path = %canonical.display(),
        "canonical record written"
    );
    Ok(merged)
}
