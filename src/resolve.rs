//! Stakeholder reference resolution.
//!
//! Stories, storylines and follow-up records hold ordered lists of opaque
//! stakeholder ids. Display names are resolved at read time against a
//! candidate pool; ids that no longer resolve are dropped with a warning.

use std::collections::{HashMap, HashSet};

use unicode_normalization::UnicodeNormalization;

use crate::db::DbStakeholder;

/// Separator used when a list of names or ids is rendered as one string.
pub const LIST_SEPARATOR: char = ',';

/// Code points that render as nothing but are not `char::is_whitespace`.
const INVISIBLE_CHARS: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Normalize a person's name for identity comparison.
///
/// NFKC folds compatibility forms (full-width letters, NBSP and the
/// ideographic space both become U+0020), then every whitespace and
/// zero-width code point is removed and the result lowercased.
pub fn normalize_name(name: &str) -> String {
    name.nfkc()
        .filter(|c| !c.is_whitespace() && !INVISIBLE_CHARS.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split a comma-joined id list, trimming entries and dropping blanks and
/// repeats while keeping first-seen order.
pub fn split_id_list(raw: &str) -> Vec<String> {
    dedupe_ids(
        raw.split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    )
}

/// Drop repeated ids, keeping the first occurrence of each.
pub fn dedupe_ids<I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Result of resolving an id list against a pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Ids that resolved, in input order.
    pub ids: Vec<String>,
    /// Display names of the resolved ids, in input order.
    pub names: Vec<String>,
    /// Ids with no match in the pool.
    pub unresolved: Vec<String>,
}

impl Resolution {
    /// Names joined with `,`, the form stored and shown as `contact_person`.
    pub fn joined(&self) -> String {
        join_names(&self.names)
    }
}

/// Resolve ids to names. Missing ids are not an error: a stakeholder may
/// have been deleted after it was referenced.
pub fn resolve_names(ids: &[String], pool: &[DbStakeholder]) -> Resolution {
    let by_id: HashMap<&str, &DbStakeholder> = pool.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut resolution = Resolution::default();
    for id in ids {
        match by_id.get(id.as_str()) {
            Some(s) => {
                resolution.ids.push(id.clone());
                resolution.names.push(s.name.clone());
            }
            None => {
                log::warn!("Stakeholder '{}' could not be resolved; omitting it", id);
                resolution.unresolved.push(id.clone());
            }
        }
    }
    resolution
}

pub fn join_names(names: &[String]) -> String {
    let mut out = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push(LIST_SEPARATOR);
        }
        out.push_str(name);
    }
    out
}

/// Stakeholders a picker may offer: everyone not resigned, plus resigned
/// stakeholders already in `keep_ids` so existing selections stay legible.
pub fn selectable_stakeholders<'a>(
    pool: &'a [DbStakeholder],
    keep_ids: &[String],
) -> Vec<&'a DbStakeholder> {
    let keep: HashSet<&str> = keep_ids.iter().map(String::as_str).collect();
    pool.iter()
        .filter(|s| !s.is_resigned || keep.contains(s.id.as_str()))
        .collect()
}

/// Rows of `pool` whose normalized name equals the normalized `name`.
pub fn find_by_normalized_name<'a>(
    pool: &'a [DbStakeholder],
    name: &str,
) -> Vec<&'a DbStakeholder> {
    let target = normalize_name(name);
    if target.is_empty() {
        return Vec::new();
    }
    pool.iter()
        .filter(|s| normalize_name(&s.name) == target)
        .collect()
}
