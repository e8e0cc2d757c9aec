//! Priority-aware field diff between a desired and a stored object.
//!
//! Both sides are compared in their serialized JSON form. The result holds
//! only the fields the backend must change, ready to send as a PATCH body.
//!
//! # Rules
//!
//! - `id` never appears; a `null` desired value means "no opinion".
//! - `tags` are sets: only tags missing on the stored side trigger a change,
//!   and the change carries the union so tags applied by hand survive.
//! - `custom_fields` diff per sub-key; only changed sub-keys are emitted.
//! - Numbers compare numerically (`2` equals `2.0`).
//! - A field that is set on the stored side and owned by a source ranked
//!   above the incoming one is left alone.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use ssot_core::{PriorityError, SourceName, SourcePriority};

/// Changed fields, keyed by wire field name.
pub type FieldDiff = Map<String, Value>;

const CUSTOM_FIELDS: &str = "custom_fields";
const TAGS: &str = "tags";

// ---------------------------------------------------------------------------
// Origin
// ---------------------------------------------------------------------------

/// Who is submitting a desired object.
///
/// `source` owns every field unless `fields` names a different source for a
/// field. An origin with no source at all is internal and bypasses priority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub source: Option<SourceName>,
    /// Per-field overrides. Custom fields use `custom_fields.<name>`.
    pub fields: BTreeMap<String, SourceName>,
}

impl Origin {
    pub fn source(name: impl Into<SourceName>) -> Self {
        Self {
            source: Some(name.into()),
            fields: BTreeMap::new(),
        }
    }

    /// The engine itself, e.g. ensuring the sentinel tag exists.
    pub fn internal() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>, source: impl Into<SourceName>) -> Self {
        self.fields.insert(field.into(), source.into());
        self
    }

    pub fn is_internal(&self) -> bool {
        self.source.is_none() && self.fields.is_empty()
    }

    /// The source that speaks for `field`.
    pub fn source_for(&self, field: &str) -> Option<&SourceName> {
        self.fields
            .get(field)
            .or_else(|| {
                field
                    .strip_prefix("custom_fields.")
                    .and_then(|_| self.fields.get(CUSTOM_FIELDS))
            })
            .or(self.source.as_ref())
    }

    /// Every source mentioned, for validation against the priority table.
    pub fn sources(&self) -> impl Iterator<Item = &SourceName> {
        self.source.iter().chain(self.fields.values())
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Ownership facts the diff consults.
#[derive(Debug, Clone, Copy)]
pub struct DiffContext<'a> {
    pub priority: &'a SourcePriority,
    pub origin: &'a Origin,
    /// Object-level owner recorded on the stored object.
    pub stored_owner: Option<&'a str>,
    /// Per-field owners recorded earlier in this run.
    pub field_owners: &'a BTreeMap<String, SourceName>,
}

impl DiffContext<'_> {
    /// Whether the incoming value for `field` may replace `stored`.
    fn allows(&self, field: &str, stored: &Value) -> Result<bool, PriorityError> {
        if is_unset(stored) {
            return Ok(true);
        }
        let Some(incoming) = self.origin.source_for(field) else {
            return Ok(true);
        };
        let incoming_rank = self.priority.require(incoming)?;

        let owner = self
            .field_owners
            .get(field)
            .map(SourceName::as_str)
            .or(self.stored_owner);
        let Some(owner) = owner else {
            return Ok(true);
        };

        match self.priority.rank_of(owner) {
            None => {
                tracing::warn!(field, owner, "owner is not in the priority table; field treated as unowned");
                Ok(true)
            }
            Some(owner_rank) if incoming_rank >= owner_rank => Ok(true),
            Some(owner_rank) => {
                tracing::debug!(
                    field,
                    incoming = %incoming,
                    owner,
                    incoming_rank,
                    owner_rank,
                    "change suppressed by higher-priority owner"
                );
                Ok(false)
            }
        }
    }
}

/// Fields of `desired` that differ from `stored` and that the incoming
/// source is allowed to write.
///
/// Fails only when the origin names a source the priority table lacks.
pub fn compute(
    desired: &Value,
    stored: &Value,
    ctx: &DiffContext<'_>,
) -> Result<FieldDiff, PriorityError> {
    let empty = Map::new();
    let desired = desired.as_object().unwrap_or(&empty);
    let stored = stored.as_object().unwrap_or(&empty);

    let mut diff = FieldDiff::new();
    for (field, want) in desired {
        if field == "id" || want.is_null() {
            continue;
        }
        let have = stored.get(field).unwrap_or(&Value::Null);

        match (field.as_str(), want) {
            (CUSTOM_FIELDS, Value::Object(want)) => {
                let changed = custom_fields_diff(want, have, ctx)?;
                if !changed.is_empty() {
                    diff.insert(field.clone(), Value::Object(changed));
                }
            }
            (TAGS, Value::Array(_)) => {
                if let Some(merged) = merged_tags(want, have) {
                    if ctx.allows(field, have)? {
                        diff.insert(field.clone(), merged);
                    }
                }
            }
            _ => {
                if !values_equal(want, have) && ctx.allows(field, have)? {
                    diff.insert(field.clone(), want.clone());
                }
            }
        }
    }
    Ok(diff)
}

/// Field names a successful write makes the origin own, with custom fields
/// expanded to `custom_fields.<name>`.
pub fn owned_fields(written: &FieldDiff) -> Vec<String> {
    let mut fields = Vec::with_capacity(written.len());
    for (field, value) in written {
        if field == "id" || value.is_null() {
            continue;
        }
        match (field.as_str(), value) {
            (CUSTOM_FIELDS, Value::Object(cf)) => {
                fields.extend(
                    cf.iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(name, _)| format!("custom_fields.{name}")),
                );
            }
            _ => fields.push(field.clone()),
        }
    }
    fields
}

fn custom_fields_diff(
    want: &Map<String, Value>,
    have: &Value,
    ctx: &DiffContext<'_>,
) -> Result<Map<String, Value>, PriorityError> {
    let mut changed = Map::new();
    for (name, value) in want {
        if value.is_null() {
            continue;
        }
        let current = have.get(name).unwrap_or(&Value::Null);
        if values_equal(value, current) {
            continue;
        }
        if ctx.allows(&format!("custom_fields.{name}"), current)? {
            changed.insert(name.clone(), value.clone());
        }
    }
    Ok(changed)
}

/// `None` when every desired tag is already present; otherwise the sorted
/// union of both sides.
fn merged_tags(want: &Value, have: &Value) -> Option<Value> {
    let want = tag_ids(want);
    let have = tag_ids(have);
    if want.is_subset(&have) {
        return None;
    }
    let union: Vec<Value> = want.union(&have).map(|id| Value::from(*id)).collect();
    Some(Value::Array(union))
}

fn tag_ids(value: &Value) -> BTreeSet<u64> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_u64().or_else(|| item.get("id")?.as_u64()))
                .collect()
        })
        .unwrap_or_default()
}

/// Ids of a list made only of bare ids or `{id}` objects.
fn id_set(items: &[Value]) -> Option<BTreeSet<u64>> {
    items
        .iter()
        .map(|item| item.as_u64().or_else(|| item.get("id")?.as_u64()))
        .collect()
}

fn str_set(items: &[Value]) -> Option<BTreeSet<&str>> {
    items.iter().map(Value::as_str).collect()
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        // Reference and content-type lists are sets; the backend picks the order.
        (Value::Array(x), Value::Array(y)) => match (id_set(x), id_set(y)) {
            (Some(x), Some(y)) => x == y,
            _ => match (str_set(x), str_set(y)) {
                (Some(x), Some(y)) => x == y,
                _ => x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y)),
            },
        },
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
