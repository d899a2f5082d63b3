use diesel::{
    Connection as _Connection,
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::{contents, lesson_drafts, lessons, section_drafts},
    types::{ChangeKind, ContentKind, EntityKind},
};
use crate::events::Actor;
use crate::models::content::{Data, InvalidContent};
use super::{
    ContentDraft,
    CourseDraft,
    EditDraftError,
    SectionDraft,
    change,
    change::Value,
    content::{FindContentDraftError, SetPayloadError},
    gc,
    section,
    section::EditSectionError,
};

/// Draft of a lesson.
///
/// Every lesson draft has a parent section draft, even when the section
/// itself is unchanged, and owns exactly one content draft selected by its
/// `kind` discriminant.
#[derive(Debug)]
pub struct LessonDraft {
    data: db::LessonDraft,
}

/// A subset of lesson draft's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: i32,
    pub section_draft: i32,
    /// ID of the published counterpart, if one exists.
    pub lesson: Option<Uuid>,
    pub title: String,
    pub index: i32,
    pub free_preview: bool,
    pub kind: ContentKind,
    pub change: ChangeKind,
}

/// Tracked fields of a lesson, as seen by the change tracker.
///
/// `section` is the published ID of the lesson's parent; it is absent while
/// the parent section exists only in the draft.
fn fields(
    title: &str,
    index: i32,
    free_preview: bool,
    kind: ContentKind,
    section: Option<Uuid>,
) -> Vec<(&'static str, Value)> {
    let mut fields = vec![
        ("title", Value::String(title.to_owned())),
        ("index", Value::Number(i64::from(index))),
        ("free_preview", Value::Boolean(free_preview)),
        ("kind", Value::String(kind.to_string())),
    ];

    if let Some(section) = section {
        fields.push(("section", Value::Reference(section)));
    }

    fields
}

impl LessonDraft {
    /// Construct `LessonDraft` from its database counterpart.
    pub(crate) fn from_db(data: db::LessonDraft) -> LessonDraft {
        LessonDraft { data }
    }

    /// Find a lesson draft by ID.
    pub fn by_id(dbconn: &Connection, id: i32)
    -> Result<LessonDraft, FindLessonDraftError> {
        lesson_drafts::table
            .filter(lesson_drafts::id.eq(id))
            .get_result::<db::LessonDraft>(dbconn)
            .optional()?
            .ok_or(FindLessonDraftError::NotFound)
            .map(LessonDraft::from_db)
    }

    /// Get all lesson drafts of a section draft, in section order.
    pub fn all_of(dbconn: &Connection, section: &SectionDraft)
    -> Result<Vec<LessonDraft>, DbError> {
        lesson_drafts::table
            .filter(lesson_drafts::section_draft.eq(section.id()))
            .order_by((lesson_drafts::index.asc(), lesson_drafts::id.asc()))
            .get_results::<db::LessonDraft>(dbconn)
            .map(|v| v.into_iter().map(LessonDraft::from_db).collect())
    }

    /// Add a new lesson to a draft, under the given section draft.
    pub fn create(
        dbconn: &Connection,
        parent: &SectionDraft,
        actor: Actor,
        title: &str,
        index: i32,
        free_preview: bool,
        content: Data,
    ) -> Result<LessonDraft, EditLessonError> {
        dbconn.transaction(|| {
            let draft =
                super::edit_context(dbconn, parent.draft_id(), actor)?;

            // Re-fetch the parent: it may have changed since the caller
            // loaded it, and adding a lesson under a section flagged for
            // removal revives the section.
            let mut parent = section_drafts::table
                .filter(section_drafts::id.eq(parent.id()))
                .get_result::<db::SectionDraft>(dbconn)
                .optional()?
                .ok_or(EditLessonError::SectionNotFound)?;

            if parent.change == ChangeKind::Deleted {
                parent = section::reclassify(dbconn, parent)?;
            }

            let kind = content.kind();
            let owned = ContentDraft::create(dbconn, draft.id, content, None)?;

            let (classification, changes) = change::classify(
                None,
                &fields(title, index, free_preview, kind, parent.section),
            );

            let row = diesel::insert_into(lesson_drafts::table)
                .values(&db::NewLessonDraft {
                    draft: draft.id,
                    section_draft: parent.id,
                    lesson: None,
                    title,
                    index,
                    free_preview,
                    kind,
                    content: owned.id(),
                    change: classification,
                })
                .get_result::<db::LessonDraft>(dbconn)?;

            change::record(
                dbconn, draft.id, EntityKind::Lesson, row.id, &changes)?;

            Ok(LessonDraft::from_db(row))
        })
    }

    /// Get the draft of a published lesson, materializing it if this is the
    /// first edit to target it.
    ///
    /// Materialization also creates the parent section draft (unchanged)
    /// when it does not exist yet, and copies the published content into an
    /// owned content draft. Idempotent: a second call returns the existing
    /// row unmodified.
    pub fn for_published(
        dbconn: &Connection,
        draft: &CourseDraft,
        actor: Actor,
        lesson: Uuid,
    ) -> Result<LessonDraft, EditLessonError> {
        dbconn.transaction(|| {
            let context = super::edit_context(dbconn, draft.id(), actor)?;

            let existing = lesson_drafts::table
                .filter(lesson_drafts::draft.eq(context.id)
                    .and(lesson_drafts::lesson.eq(lesson)))
                .get_result::<db::LessonDraft>(dbconn)
                .optional()?;

            if let Some(data) = existing {
                return Ok(LessonDraft::from_db(data));
            }

            let published = lessons::table
                .filter(lessons::id.eq(lesson))
                .get_result::<db::Lesson>(dbconn)
                .optional()?
                .ok_or(EditLessonError::NotFound)?;

            let parent = SectionDraft::for_published(
                dbconn, draft, actor, published.section)?;

            let payload = contents::table
                .filter(contents::id.eq(published.content))
                .get_result::<db::Content>(dbconn)
                .optional()?
                .ok_or(DbError::NotFound)?;
            let payload = Data::from_columns(
                payload.kind,
                payload.url,
                payload.mime,
                payload.duration,
                payload.data,
            )?;

            let owned = ContentDraft::create(
                dbconn,
                context.id,
                payload.clone(),
                Some((published.content, &payload)),
            )?;

            let row = diesel::insert_into(lesson_drafts::table)
                .values(&db::NewLessonDraft {
                    draft: context.id,
                    section_draft: parent.id(),
                    lesson: Some(lesson),
                    title: &published.title,
                    index: published.index,
                    free_preview: published.free_preview,
                    kind: published.kind,
                    content: owned.id(),
                    change: ChangeKind::Unchanged,
                })
                .get_result::<db::LessonDraft>(dbconn)?;

            Ok(LessonDraft::from_db(row))
        })
    }

    /// Get ID of this lesson draft.
    pub fn id(&self) -> i32 {
        self.data.id
    }

    /// Get the classification of this lesson draft.
    pub fn change(&self) -> ChangeKind {
        self.data.change
    }

    /// Get this lesson draft's owned content draft.
    pub fn content(&self, dbconn: &Connection)
    -> Result<ContentDraft, FindContentDraftError> {
        ContentDraft::by_id(dbconn, self.data.content)
    }

    /// Get the public portion of this lesson draft's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            section_draft: self.data.section_draft,
            lesson: self.data.lesson,
            title: self.data.title.clone(),
            index: self.data.index,
            free_preview: self.data.free_preview,
            kind: self.data.kind,
            change: self.data.change,
        }
    }

    /// Change title of this lesson draft.
    pub fn set_title(&mut self, dbconn: &Connection, actor: Actor, title: &str)
    -> Result<(), EditLessonError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            self.data = diesel::update(&self.data)
                .set(lesson_drafts::title.eq(title))
                .get_result::<db::LessonDraft>(dbconn)?;

            self.refresh(dbconn)
        })
    }

    /// Move this lesson draft to another position within its section.
    pub fn set_index(&mut self, dbconn: &Connection, actor: Actor, index: i32)
    -> Result<(), EditLessonError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            self.data = diesel::update(&self.data)
                .set(lesson_drafts::index.eq(index))
                .get_result::<db::LessonDraft>(dbconn)?;

            self.refresh(dbconn)
        })
    }

    /// Change whether this lesson is viewable without enrolling.
    pub fn set_free_preview(
        &mut self,
        dbconn: &Connection,
        actor: Actor,
        free_preview: bool,
    ) -> Result<(), EditLessonError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            self.data = diesel::update(&self.data)
                .set(lesson_drafts::free_preview.eq(free_preview))
                .get_result::<db::LessonDraft>(dbconn)?;

            self.refresh(dbconn)
        })
    }

    /// Move this lesson draft under another section draft of the same
    /// course draft.
    pub fn set_section(
        &mut self,
        dbconn: &Connection,
        actor: Actor,
        parent: &SectionDraft,
    ) -> Result<(), EditLessonError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            let mut parent = section_drafts::table
                .filter(section_drafts::id.eq(parent.id())
                    .and(section_drafts::draft.eq(self.data.draft)))
                .get_result::<db::SectionDraft>(dbconn)
                .optional()?
                .ok_or(EditLessonError::SectionNotFound)?;

            if parent.change == ChangeKind::Deleted {
                parent = section::reclassify(dbconn, parent)?;
            }

            self.data = diesel::update(&self.data)
                .set(lesson_drafts::section_draft.eq(parent.id))
                .get_result::<db::LessonDraft>(dbconn)?;

            self.refresh(dbconn)
        })
    }

    /// Replace the content attached to this lesson draft.
    ///
    /// Changing the payload to a different kind is allowed; the lesson's
    /// discriminant follows it.
    pub fn set_content(&mut self, dbconn: &Connection, actor: Actor, content: Data)
    -> Result<(), EditLessonError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            let kind = content.kind();

            match ContentDraft::by_id(dbconn, self.data.content) {
                Ok(mut owned) => owned.set_payload(dbconn, content)?,
                // The owned draft has gone missing; recover by creating a
                // replacement bound to the published payload, if any.
                Err(FindContentDraftError::NotFound) => {
                    warn!(
                        "lesson draft {} references missing content draft {}",
                        self.data.id, self.data.content,
                    );

                    let published = self.published_content(dbconn)?;
                    let owned = ContentDraft::create(
                        dbconn,
                        self.data.draft,
                        content,
                        published.as_ref().map(|&(id, ref data)| (id, data)),
                    )?;

                    self.data = diesel::update(&self.data)
                        .set(lesson_drafts::content.eq(owned.id()))
                        .get_result::<db::LessonDraft>(dbconn)?;
                }
                Err(FindContentDraftError::Database(e)) => return Err(e.into()),
            }

            if self.data.kind != kind {
                self.data = diesel::update(&self.data)
                    .set(lesson_drafts::kind.eq(kind))
                    .get_result::<db::LessonDraft>(dbconn)?;
            }

            self.refresh(dbconn)
        })
    }

    /// Published content of this lesson draft's counterpart, if any.
    fn published_content(&self, dbconn: &Connection)
    -> Result<Option<(i32, Data)>, EditLessonError> {
        let lesson = match self.data.lesson {
            Some(id) => lessons::table
                .filter(lessons::id.eq(id))
                .get_result::<db::Lesson>(dbconn)
                .optional()?,
            None => None,
        };

        match lesson {
            Some(lesson) => {
                let row = contents::table
                    .filter(contents::id.eq(lesson.content))
                    .get_result::<db::Content>(dbconn)
                    .optional()?
                    .ok_or(DbError::NotFound)?;
                let data = Data::from_columns(
                    row.kind, row.url, row.mime, row.duration, row.data)?;
                Ok(Some((lesson.content, data)))
            }
            None => Ok(None),
        }
    }

    /// Reclassify this lesson draft against its published counterpart.
    fn refresh(&mut self, dbconn: &Connection) -> Result<(), EditLessonError> {
        let published = match self.data.lesson {
            Some(id) => lessons::table
                .filter(lessons::id.eq(id))
                .get_result::<db::Lesson>(dbconn)
                .optional()?
                .map(|lesson| fields(
                    &lesson.title,
                    lesson.index,
                    lesson.free_preview,
                    lesson.kind,
                    Some(lesson.section),
                )),
            None => None,
        };

        let parent = section_drafts::table
            .filter(section_drafts::id.eq(self.data.section_draft))
            .get_result::<db::SectionDraft>(dbconn)
            .optional()?
            .ok_or(EditLessonError::SectionNotFound)?;

        let (kind, changes) = change::classify(
            published.as_ref().map(Vec::as_slice),
            &fields(
                &self.data.title,
                self.data.index,
                self.data.free_preview,
                self.data.kind,
                parent.section,
            ),
        );

        self.data = diesel::update(&self.data)
            .set(lesson_drafts::change.eq(kind))
            .get_result::<db::LessonDraft>(dbconn)?;

        change::record(
            dbconn, self.data.draft, EntityKind::Lesson, self.data.id, &changes)?;

        Ok(())
    }

    /// Delete this lesson draft.
    ///
    /// A lesson that exists only in the draft is removed outright, together
    /// with its owned content draft; a published-backed one is flagged for
    /// removal (as is its content draft) so the merge can apply the
    /// deletion. A missing content draft is logged and recovered, never
    /// fatal.
    pub fn delete(self, dbconn: &Connection, actor: Actor)
    -> Result<(), EditLessonError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            if self.data.change == ChangeKind::New {
                gc::collect_lesson(dbconn, &self.data)?;
                diesel::delete(&self.data).execute(dbconn)?;
                return Ok(());
            }

            match ContentDraft::by_id(dbconn, self.data.content) {
                Ok(mut owned) => owned.mark_deleted(dbconn)?,
                Err(FindContentDraftError::NotFound) => warn!(
                    "lesson draft {} references missing content draft {}",
                    self.data.id, self.data.content,
                ),
                Err(FindContentDraftError::Database(e)) => return Err(e.into()),
            }

            diesel::update(&self.data)
                .set(lesson_drafts::change.eq(ChangeKind::Deleted))
                .execute(dbconn)?;

            change::clear(
                dbconn, self.data.draft, EntityKind::Lesson, self.data.id)?;

            Ok(())
        })
    }
}

#[derive(Debug, Fail)]
pub enum FindLessonDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No lesson draft found matching given criteria.
    #[fail(display = "No such lesson draft")]
    NotFound,
}

impl_from! { for FindLessonDraftError ;
    DbError => |e| FindLessonDraftError::Database(e),
}

#[derive(Debug, Fail)]
pub enum EditLessonError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The owning draft cannot be edited.
    #[fail(display = "{}", _0)]
    Draft(#[cause] EditDraftError),
    /// No such lesson within this draft's course.
    #[fail(display = "No such lesson")]
    NotFound,
    /// The parent section (or its draft) is missing.
    #[fail(display = "No such section")]
    SectionNotFound,
    /// A stored content payload is inconsistent with its discriminant.
    #[fail(display = "{}", _0)]
    Invalid(#[cause] InvalidContent),
}

impl_from! { for EditLessonError ;
    DbError => |e| EditLessonError::Database(e),
    EditDraftError => |e| match e {
        EditDraftError::Database(e) => EditLessonError::Database(e),
        e => EditLessonError::Draft(e),
    },
    EditSectionError => |e| match e {
        EditSectionError::Database(e) => EditLessonError::Database(e),
        EditSectionError::Draft(e) => EditLessonError::Draft(e),
        EditSectionError::NotFound => EditLessonError::SectionNotFound,
    },
    SetPayloadError => |e| match e {
        SetPayloadError::Database(e) => EditLessonError::Database(e),
        SetPayloadError::Invalid(e) => EditLessonError::Invalid(e),
    },
    InvalidContent => |e| EditLessonError::Invalid(e),
}
