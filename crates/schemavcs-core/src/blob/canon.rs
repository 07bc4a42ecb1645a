//! DDL canonicalization.
//!
//! Normalizes raw DDL text to a stable representation so two semantically
//! identical definitions hash to the same blob regardless of formatting.
//! Only `ObjectType::is_first_class_for_hashing()` kinds are canonicalized;
//! everything else is stored opaquely (raw text, unmodified).

use std::time::Instant;

use schemavcs_catalog::{ConstraintDef, ObjectType, TableDescriptor};
use tracing::warn;

use crate::error::EngineError;

const DEFAULT_MAX_DDL_BYTES: usize = 100_000;
const CANONICALIZATION_WARN_MS: u128 = 1000;

/// Collapses a raw DDL string into canonical form per the object's kind.
///
/// Rules applied uniformly to first-class kinds:
/// - lowercase all keywords
/// - collapse repeated whitespace to a single space, trim ends
/// - normalize type aliases (`character varying(n)` -> `varchar(n)`)
/// - strip explicit casts (`::<type>`) from default expressions
/// - strip schema qualifiers from view/function bodies
///
/// Opaque kinds pass through unchanged aside from whitespace trimming.
///
/// This text-level pass has no parser, so it cannot reorder column,
/// constraint, or index clauses inside a raw DDL string — that requires the
/// structured form. When the catalog supplies one (`CatalogObjectDescriptor::table`,
/// tables only), [`Blob::from_descriptor`](super::Blob::from_descriptor)
/// calls [`canonicalize_table`] instead, which *does* sort column lists by
/// ordinal, constraints by `(kind, name)`, and indexes by name (`spec.md`
/// §4.1) before hashing.
pub fn canonicalize(
    object_type: ObjectType,
    raw: &str,
    max_bytes: usize,
) -> Result<String, EngineError> {
    if raw.len() > max_bytes {
        return Err(EngineError::DdlTooLarge {
            actual_bytes: raw.len(),
            max_bytes,
        });
    }

    let started = Instant::now();

    let canonical = if object_type.is_first_class_for_hashing() {
        canonicalize_first_class(object_type, raw)?
    } else {
        raw.trim().to_string()
    };

    let elapsed = started.elapsed();
    if elapsed.as_millis() > CANONICALIZATION_WARN_MS {
        warn!(
            object_type = %object_type,
            elapsed_ms = elapsed.as_millis() as u64,
            "canonicalization exceeded warn threshold"
        );
    }

    Ok(canonical)
}

fn canonicalize_first_class(
    object_type: ObjectType,
    raw: &str,
) -> Result<String, EngineError> {
    if raw.trim().is_empty() {
        return Err(EngineError::CanonicalizationError {
            reason: "empty DDL body".to_string(),
        });
    }

    let collapsed = collapse_whitespace(&raw.to_lowercase());
    let normalized = normalize_type_aliases(&collapsed);
    let stripped = strip_explicit_casts(&normalized);

    let result = match object_type {
        ObjectType::View | ObjectType::MaterializedView | ObjectType::Function => {
            strip_schema_qualifiers(&stripped)
        }
        _ => stripped,
    };

    Ok(result.trim().to_string())
}

/// Renders a structured table descriptor into canonical text: columns
/// sorted by ordinal, constraints by `(kind, name)`, indexes by name
/// (`spec.md` §4.1) — so two DDL strings that only reorder these clauses
/// produce the same blob id. Used in place of text-level canonicalization
/// whenever the catalog supplies a structured descriptor alongside the raw
/// DDL (`CatalogObjectDescriptor::table`).
pub fn canonicalize_table(table: &TableDescriptor) -> String {
    let mut columns = table.columns.clone();
    columns.sort_by_key(|c| c.ordinal);
    let mut constraints = table.constraints.clone();
    constraints.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
    let mut indexes = table.indexes.clone();
    indexes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = format!("table {}.{}\n", table.schema, table.name);
    for c in &columns {
        let data_type = normalize_type_aliases(&collapse_whitespace(&c.data_type.to_lowercase()));
        let default = c
            .default
            .as_deref()
            .map(|d| strip_explicit_casts(&collapse_whitespace(&d.to_lowercase())))
            .unwrap_or_default();
        out.push_str(&format!(
            "col {} {} {} null={} default={}\n",
            c.ordinal, c.name, data_type, c.nullable, default
        ));
    }
    for c in &constraints {
        out.push_str(&format!("constraint {} {}\n", c.name, constraint_signature(c)));
    }
    for i in &indexes {
        out.push_str(&format!(
            "index {} unique={} {}\n",
            i.name,
            i.unique,
            collapse_whitespace(&i.definition.to_lowercase())
        ));
    }
    out
}

fn constraint_signature(c: &ConstraintDef) -> String {
    format!(
        "{:?} {}",
        c.kind,
        collapse_whitespace(&c.definition.to_lowercase())
    )
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

fn normalize_type_aliases(s: &str) -> String {
    s.replace("character varying", "varchar")
        .replace("double precision", "float8")
        .replace("int4", "integer")
        .replace("boolean", "bool")
}

/// Strips `::<type>` casts from default expressions, e.g.
/// `'active'::character varying` -> `'active'`.
fn strip_explicit_casts(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if ch == ':' && s[i..].starts_with("::") {
            // Skip the `::` and the following type token.
            let rest = &s[i + 2..];
            let skip_len = rest
                .find(|c: char| c.is_whitespace() || c == ',' || c == ')')
                .unwrap_or(rest.len());
            for _ in 0..skip_len + 1 {
                chars.next();
            }
            continue;
        }
        out.push(ch);
    }
    out
}

/// Strips a leading `schema.` qualifier from identifiers in view/function
/// bodies, so moving an object between schemas doesn't change its hash.
fn strip_schema_qualifiers(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word = String::new();
    for ch in s.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '.' {
            word.push(ch);
        } else {
            out.push_str(&strip_qualifier_word(&word));
            out.push(ch);
            word.clear();
        }
    }
    out.push_str(&strip_qualifier_word(&word));
    out
}

fn strip_qualifier_word(word: &str) -> String {
    if let Some((_, rest)) = word.split_once('.') {
        if !rest.is_empty() {
            return rest.to_string();
        }
    }
    word.to_string()
}
