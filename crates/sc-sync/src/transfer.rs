use crate::contacts::{ContactRow, ContactStore, sanitize_rows};
use sc_core::{ContactsError, ContactsResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ExportedContact<'a> {
    label: &'a str,
}

/// Active contacts as pretty-printed `{id: {"label": ...}}` JSON.
pub fn export_contacts(store: &ContactStore) -> ContactsResult<String> {
    let exported: BTreeMap<&str, ExportedContact<'_>> = store
        .entries()
        .filter_map(|(id, entry)| {
            entry
                .label
                .as_deref()
                .map(|label| (id.as_str(), ExportedContact { label }))
        })
        .collect();

    serde_json::to_string_pretty(&exported)
        .map_err(|err| ContactsError::io(format!("failed to encode export: {err}")))
}

/// Reads an exported file back into rows. Both `{id: label}` and
/// `{id: {"label": ...}}` are accepted; ids that are blank, contain a comma,
/// or read as a number are skipped, as are values of any other shape.
pub fn parse_import(text: &str) -> ContactsResult<Vec<ContactRow>> {
    let parsed = serde_json::from_str::<Value>(text)
        .map_err(|err| ContactsError::usage(format!("import file is not valid JSON: {err}")))?;

    let Value::Object(entries) = parsed else {
        return Err(ContactsError::usage(
            "unexpected import format: expected a JSON object of contacts",
        ));
    };

    let mut rows = Vec::new();
    for (id, value) in entries {
        if id.is_empty() || id.contains(',') || looks_numeric(&id) {
            tracing::debug!(id = %id, "skipping imported id");
            continue;
        }

        let label = match value {
            Value::String(label) => label,
            Value::Object(mut fields) => match fields.remove("label") {
                Some(Value::String(label)) => label,
                _ => continue,
            },
            _ => continue,
        };
        rows.push(ContactRow { id, label });
    }

    let rows = sanitize_rows(rows);
    if rows.is_empty() {
        return Err(ContactsError::usage("no valid contacts found in import"));
    }

    Ok(rows)
}

/// Mirrors how a browser coerces an object key to a number: blank text,
/// decimal and exponent forms, `0x`/`0o`/`0b` literals and `Infinity` all
/// count as numeric.
fn looks_numeric(id: &str) -> bool {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return true;
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return !digits.is_empty() && digits.chars().all(|ch| ch.is_digit(radix));
        }
    }

    let unsigned = trimmed
        .strip_prefix('+')
        .or_else(|| trimmed.strip_prefix('-'))
        .unwrap_or(trimmed);
    if unsigned == "Infinity" {
        return true;
    }

    unsigned
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-'))
        && trimmed.parse::<f64>().is_ok()
}
