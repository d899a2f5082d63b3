//! Field-level change tracking.
//!
//! Every draft node is classified against its published counterpart from the
//! actual values of its tracked fields, and the classification is recomputed
//! on every write, so it can never go stale. Differences are persisted as
//! `draft_changes` rows, one per differing field, which together form the
//! draft's ordered change log.

use diesel::{
    prelude::*,
    result::Error as DbError,
};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::draft_changes,
    types::{ChangeKind, EntityKind},
};

/// A single tracked field value.
///
/// Old and new values cross the diff/merge boundary as this closed union
/// rather than as free-form JSON, so a recorded change can always be decoded
/// back into a typed value.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Number(i64),
    Boolean(bool),
    Reference(Uuid),
}

impl Value {
    fn to_json(&self) -> Json {
        serde_json::to_value(self)
            .expect("field value serialization cannot fail")
    }

    fn from_json(json: &Json) -> Option<Value> {
        serde_json::from_value(json.clone()).ok()
    }
}

/// Difference in a single tracked field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Compute the difference between a published field set and a draft field
/// set.
///
/// Only fields whose values actually differ produce a record; a field
/// present on one side only records `None` for the other.
pub(crate) fn diff(
    published: &[(&'static str, Value)],
    draft: &[(&'static str, Value)],
) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    for &(name, ref old) in published {
        match draft.iter().find(|&&(n, _)| n == name) {
            Some(&(_, ref new)) if new == old => {}
            Some(&(_, ref new)) => changes.push(FieldChange {
                field: name.to_string(),
                old: Some(old.clone()),
                new: Some(new.clone()),
            }),
            None => changes.push(FieldChange {
                field: name.to_string(),
                old: Some(old.clone()),
                new: None,
            }),
        }
    }

    for &(name, ref new) in draft {
        if published.iter().all(|&(n, _)| n != name) {
            changes.push(FieldChange {
                field: name.to_string(),
                old: None,
                new: Some(new.clone()),
            });
        }
    }

    changes
}

/// Classify a draft node against its published counterpart and produce the
/// field records to persist for it.
///
/// `Deleted` is not derived here; flagging a node for removal is an explicit
/// operation of the delete paths and overrides any field differences.
pub(crate) fn classify(
    published: Option<&[(&'static str, Value)]>,
    draft: &[(&'static str, Value)],
) -> (ChangeKind, Vec<FieldChange>) {
    match published {
        None => {
            let changes = draft.iter()
                .map(|&(name, ref value)| FieldChange {
                    field: name.to_string(),
                    old: None,
                    new: Some(value.clone()),
                })
                .collect();
            (ChangeKind::New, changes)
        }
        Some(published) => {
            let changes = diff(published, draft);
            if changes.is_empty() {
                (ChangeKind::Unchanged, changes)
            } else {
                (ChangeKind::Modified, changes)
            }
        }
    }
}

/// Replace the recorded field changes for an entity.
pub(crate) fn record(
    dbconn: &Connection,
    draft: i32,
    entity: EntityKind,
    entity_id: i32,
    changes: &[FieldChange],
) -> Result<(), DbError> {
    clear(dbconn, draft, entity, entity_id)?;

    if changes.is_empty() {
        return Ok(());
    }

    let rows = changes.iter()
        .map(|change| db::NewDraftChange {
            draft,
            entity,
            entity_id,
            field: change.field.as_str(),
            old: change.old.as_ref().map(Value::to_json),
            new: change.new.as_ref().map(Value::to_json),
        })
        .collect::<Vec<_>>();

    diesel::insert_into(draft_changes::table)
        .values(&rows)
        .execute(dbconn)?;

    Ok(())
}

/// Remove all recorded field changes for an entity.
pub(crate) fn clear(
    dbconn: &Connection,
    draft: i32,
    entity: EntityKind,
    entity_id: i32,
) -> Result<(), DbError> {
    diesel::delete(draft_changes::table
        .filter(draft_changes::draft.eq(draft)
            .and(draft_changes::entity.eq(entity))
            .and(draft_changes::entity_id.eq(entity_id))))
        .execute(dbconn)?;
    Ok(())
}

/// Rebuild a [`FieldChange`] from its database counterpart.
///
/// A value which cannot be decoded (which would mean the row was written by
/// something other than this module) is surfaced as `None`.
pub(crate) fn from_row(row: db::DraftChange) -> FieldChange {
    FieldChange {
        old: row.old.as_ref().and_then(Value::from_json),
        new: row.new.as_ref().and_then(Value::from_json),
        field: row.field,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(value: &str) -> (&'static str, Value) {
        ("title", Value::String(value.to_string()))
    }

    #[test]
    fn equal_fields_produce_no_changes() {
        let published = [title("Intro"), ("index", Value::Number(0))];
        let draft = [title("Intro"), ("index", Value::Number(0))];

        assert_eq!(diff(&published, &draft), []);
        assert_eq!(
            classify(Some(&published[..]), &draft).0,
            ChangeKind::Unchanged,
        );
    }

    #[test]
    fn differing_field_is_recorded_with_both_values() {
        let published = [title("Intro"), ("index", Value::Number(0))];
        let draft = [title("Introduction"), ("index", Value::Number(0))];

        let (kind, changes) = classify(Some(&published[..]), &draft);

        assert_eq!(kind, ChangeKind::Modified);
        assert_eq!(changes, [FieldChange {
            field: "title".to_string(),
            old: Some(Value::String("Intro".to_string())),
            new: Some(Value::String("Introduction".to_string())),
        }]);
    }

    #[test]
    fn reverted_field_reclassifies_as_unchanged() {
        let published = [title("Intro")];
        let edited = [title("Introduction")];
        let reverted = [title("Intro")];

        assert_eq!(classify(Some(&published[..]), &edited).0, ChangeKind::Modified);
        assert_eq!(
            classify(Some(&published[..]), &reverted).0,
            ChangeKind::Unchanged,
        );
    }

    #[test]
    fn node_without_counterpart_is_new() {
        let draft = [title("Intro"), ("free_preview", Value::Boolean(true))];

        let (kind, changes) = classify(None, &draft);

        assert_eq!(kind, ChangeKind::New);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.old.is_none()));
    }

    #[test]
    fn one_sided_fields_record_none_for_the_other_side() {
        let published = [
            title("Moves"),
            ("section", Value::Reference(uuid::Uuid::from_bytes([0xab; 16]))),
        ];
        let draft = [title("Moves")];

        let changes = diff(&published, &draft);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "section");
        assert!(changes[0].old.is_some());
        assert!(changes[0].new.is_none());
    }

    #[test]
    fn values_survive_json_round_trip() {
        for value in vec![
            Value::String("Intro".to_string()),
            Value::Number(42),
            Value::Boolean(false),
            Value::Reference(uuid::Uuid::from_bytes([0x11; 16])),
        ] {
            assert_eq!(Value::from_json(&value.to_json()), Some(value));
        }
    }
}
