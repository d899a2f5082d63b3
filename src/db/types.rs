use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};

use std::fmt;

/// Lifecycle state of a course draft.
///
/// `Approved` is terminal and never stored: approving a draft merges it into
/// the published tree and purges the row in the same transaction, so the
/// state is only ever visible in the event history.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Draft_status"]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    /// Draft is open for editing.
    Draft,
    /// Draft was submitted and awaits moderation.
    Pending,
    /// Draft was approved and merged.
    Approved,
    /// Draft was rejected by a moderator. It remains editable; the first
    /// subsequent edit reopens it.
    Rejected,
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            DraftStatus::Draft => "draft",
            DraftStatus::Pending => "pending",
            DraftStatus::Approved => "approved",
            DraftStatus::Rejected => "rejected",
        })
    }
}

/// Classification of a draft node relative to its published counterpart.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Change_kind"]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// No published counterpart exists.
    New,
    /// A counterpart exists and at least one tracked field differs.
    Modified,
    /// Node is flagged for removal, regardless of other field differences.
    Deleted,
    /// A counterpart exists and all tracked fields are equal.
    Unchanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            ChangeKind::New => "new",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Unchanged => "unchanged",
        })
    }
}

/// Discriminant of a lesson's attached content.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Content_kind"]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Material,
    Quiz,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            ContentKind::Video => "video",
            ContentKind::Material => "material",
            ContentKind::Quiz => "quiz",
        })
    }
}

/// Kind of entity a change log entry refers to.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Entity_kind"]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Course,
    Section,
    Lesson,
    Content,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            EntityKind::Course => "course",
            EntityKind::Section => "section",
            EntityKind::Lesson => "lesson",
            EntityKind::Content => "content",
        })
    }
}
