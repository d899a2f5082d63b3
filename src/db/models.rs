use chrono::NaiveDateTime;
use serde_json::Value as Json;
use uuid::Uuid;

use super::schema::*;
use super::types::{ChangeKind, ContentKind, DraftStatus, EntityKind};

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct Course {
    /// ID of this course.
    pub id: Uuid,
    /// Title of this course.
    pub title: String,
    /// Description shown on the course's public page.
    pub description: String,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "courses"]
pub struct NewCourse<'a> {
    pub id: Uuid,
    pub title: &'a str,
    pub description: &'a str,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct Section {
    /// ID of this section.
    pub id: Uuid,
    /// ID of the course this section belongs to.
    pub course: Uuid,
    /// Title of this section.
    pub title: String,
    /// Position of this section within its course.
    pub index: i32,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "sections"]
pub struct NewSection<'a> {
    pub id: Uuid,
    pub course: Uuid,
    pub title: &'a str,
    pub index: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct Lesson {
    /// ID of this lesson.
    pub id: Uuid,
    /// ID of the section this lesson belongs to.
    pub section: Uuid,
    /// Title of this lesson.
    pub title: String,
    /// Position of this lesson within its section.
    pub index: i32,
    /// Whether this lesson is viewable without enrolling.
    pub free_preview: bool,
    /// Discriminant of the attached content.
    pub kind: ContentKind,
    /// ID of the attached content.
    pub content: i32,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "lessons"]
pub struct NewLesson<'a> {
    pub id: Uuid,
    pub section: Uuid,
    pub title: &'a str,
    pub index: i32,
    pub free_preview: bool,
    pub kind: ContentKind,
    pub content: i32,
}

/// Typed payload of a lesson. Which of the payload columns are populated
/// depends on `kind`; rows are only read and written through
/// [`crate::models::content::Data`], which enforces consistency.
#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct Content {
    pub id: i32,
    pub kind: ContentKind,
    pub url: Option<String>,
    pub mime: Option<String>,
    pub duration: Option<i32>,
    pub data: Option<Json>,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "contents"]
pub struct NewContent {
    pub kind: ContentKind,
    pub url: Option<String>,
    pub mime: Option<String>,
    pub duration: Option<i32>,
    pub data: Option<Json>,
}

#[derive(AsChangeset, Clone, Debug)]
#[table_name = "contents"]
#[changeset_options(treat_none_as_null = "true")]
pub struct ContentPayload {
    pub kind: ContentKind,
    pub url: Option<String>,
    pub mime: Option<String>,
    pub duration: Option<i32>,
    pub data: Option<Json>,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct CourseDraft {
    /// ID of this draft.
    pub id: i32,
    /// ID of the published course this is a draft of.
    pub course: Uuid,
    /// Lifecycle state of this draft.
    pub status: DraftStatus,
    /// Draft value of the course's title.
    pub title: String,
    /// Draft value of the course's description.
    pub description: String,
    /// Date this draft was created.
    pub created: NaiveDateTime,
    /// Date of the last edit or lifecycle transition.
    pub updated: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "course_drafts"]
pub struct NewCourseDraft<'a> {
    pub course: Uuid,
    pub status: DraftStatus,
    pub title: &'a str,
    pub description: &'a str,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct SectionDraft {
    /// ID of this section draft.
    pub id: i32,
    /// ID of the course draft owning this row.
    pub draft: i32,
    /// ID of the published counterpart, if one exists.
    pub section: Option<Uuid>,
    pub title: String,
    pub index: i32,
    /// Classification relative to the published counterpart.
    pub change: ChangeKind,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "section_drafts"]
pub struct NewSectionDraft<'a> {
    pub draft: i32,
    pub section: Option<Uuid>,
    pub title: &'a str,
    pub index: i32,
    pub change: ChangeKind,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct LessonDraft {
    /// ID of this lesson draft.
    pub id: i32,
    /// ID of the course draft owning this row.
    pub draft: i32,
    /// ID of the parent section draft. Always present, even when the section
    /// itself is unchanged.
    pub section_draft: i32,
    /// ID of the published counterpart, if one exists.
    pub lesson: Option<Uuid>,
    pub title: String,
    pub index: i32,
    pub free_preview: bool,
    /// Discriminant of the attached content draft.
    pub kind: ContentKind,
    /// ID of the owned content draft. Not a foreign key: the cascade sweep
    /// tolerates (and logs) a dangling reference.
    pub content: i32,
    /// Classification relative to the published counterpart.
    pub change: ChangeKind,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "lesson_drafts"]
pub struct NewLessonDraft<'a> {
    pub draft: i32,
    pub section_draft: i32,
    pub lesson: Option<Uuid>,
    pub title: &'a str,
    pub index: i32,
    pub free_preview: bool,
    pub kind: ContentKind,
    pub content: i32,
    pub change: ChangeKind,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct ContentDraft {
    /// ID of this content draft.
    pub id: i32,
    /// ID of the course draft owning this row.
    pub draft: i32,
    pub kind: ContentKind,
    pub url: Option<String>,
    pub mime: Option<String>,
    pub duration: Option<i32>,
    pub data: Option<Json>,
    /// ID of the published counterpart, if one exists.
    pub content: Option<i32>,
    /// Classification relative to the published counterpart.
    pub change: ChangeKind,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "content_drafts"]
pub struct NewContentDraft {
    pub draft: i32,
    pub kind: ContentKind,
    pub url: Option<String>,
    pub mime: Option<String>,
    pub duration: Option<i32>,
    pub data: Option<Json>,
    pub content: Option<i32>,
    pub change: ChangeKind,
}

#[derive(AsChangeset, Clone, Debug)]
#[table_name = "content_drafts"]
#[changeset_options(treat_none_as_null = "true")]
pub struct ContentDraftPayload {
    pub kind: ContentKind,
    pub url: Option<String>,
    pub mime: Option<String>,
    pub duration: Option<i32>,
    pub data: Option<Json>,
}

/// A single recorded field difference. Rows exist only for fields whose
/// draft value actually differs from the published one and are refreshed
/// wholesale on every write, so they can never go stale.
#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct DraftChange {
    pub id: i32,
    pub draft: i32,
    pub entity: EntityKind,
    pub entity_id: i32,
    pub field: String,
    pub old: Option<Json>,
    pub new: Option<Json>,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "draft_changes"]
pub struct NewDraftChange<'a> {
    pub draft: i32,
    pub entity: EntityKind,
    pub entity_id: i32,
    pub field: &'a str,
    pub old: Option<Json>,
    pub new: Option<Json>,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct DraftEvent {
    /// ID of this event.
    pub id: i32,
    /// ID of the course whose draft generated this event. Kept by course, not
    /// by draft, so the record survives the draft's purge.
    pub course: Uuid,
    /// Short string describing what kind of event this is.
    pub kind: String,
    /// User who triggered the event, if any.
    pub actor: Option<i32>,
    /// Time at which this event was generated.
    pub timestamp: NaiveDateTime,
    /// Actual data for the event, serialized as MessagePack.
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "draft_events"]
pub struct NewDraftEvent<'a> {
    pub course: Uuid,
    pub kind: &'a str,
    pub actor: Option<i32>,
    pub data: &'a [u8],
}
