//! Draft overlay of the published course tree.
//!
//! A course draft is a private, mutable mirror of an already-published
//! course. It is created lazily by the first mutating edit, accumulates
//! section/lesson/content drafts (each classified against its published
//! counterpart), passes through a moderation workflow, and is finally
//! either merged into the published tree or discarded.

use diesel::{
    Connection as _Connection,
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;
use itertools::Itertools;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::{
        content_drafts,
        courses,
        course_drafts,
        draft_changes,
        lesson_drafts,
        section_drafts,
    },
    types::{ChangeKind, DraftStatus, EntityKind},
};
use crate::events::{
    self,
    Actor,
    DraftApproved,
    DraftCanceled,
    DraftCreated,
    DraftRejected,
    DraftReopened,
    DraftSubmitted,
};

pub mod change;
pub mod content;
pub mod gc;
pub mod lesson;
pub mod merge;
pub mod section;

pub use self::{
    change::{FieldChange, Value},
    content::ContentDraft,
    lesson::LessonDraft,
    merge::MergeError,
    section::SectionDraft,
};

/// Draft of a course.
#[derive(Debug)]
pub struct CourseDraft {
    data: db::CourseDraft,
}

/// A subset of course draft's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: i32,
    pub course: Uuid,
    pub status: DraftStatus,
    pub title: String,
    pub description: String,
}

/// One entry of a draft's change log: an entity together with its
/// classification and recorded field differences, in draft order.
#[derive(Debug, Serialize)]
pub struct ChangeLogEntry {
    pub entity: EntityKind,
    pub entity_id: i32,
    pub change: ChangeKind,
    pub fields: Vec<FieldChange>,
}

/// Tracked course-level fields, as seen by the change tracker.
fn fields(title: &str, description: &str) -> Vec<(&'static str, Value)> {
    vec![
        ("title", Value::String(title.to_owned())),
        ("description", Value::String(description.to_owned())),
    ]
}

impl CourseDraft {
    /// Construct `CourseDraft` from its database counterpart.
    pub(crate) fn from_db(data: db::CourseDraft) -> CourseDraft {
        CourseDraft { data }
    }

    /// Get the draft of a course, materializing an empty shell if none is
    /// open yet.
    ///
    /// Idempotent: repeated (or concurrent) calls for the same course
    /// return the same draft. The per-course lock serializes callers, and a
    /// partial unique index on live drafts backs the invariant at the
    /// storage level.
    pub fn get_or_create(dbconn: &Connection, course: Uuid, actor: Actor)
    -> Result<CourseDraft, CreateDraftError> {
        dbconn.transaction(|| {
            let published = lock_course(dbconn, course)?
                .ok_or(CreateDraftError::CourseNotFound)?;

            let existing = course_drafts::table
                .filter(course_drafts::course.eq(course))
                .get_result::<db::CourseDraft>(dbconn)
                .optional()?;

            if let Some(data) = existing {
                return Ok(CourseDraft::from_db(data));
            }

            let data = diesel::insert_into(course_drafts::table)
                .values(&db::NewCourseDraft {
                    course,
                    status: DraftStatus::Draft,
                    title: &published.title,
                    description: &published.description,
                })
                .get_result::<db::CourseDraft>(dbconn)?;

            events::store(dbconn, actor, &DraftCreated { course }.into())?;

            Ok(CourseDraft::from_db(data))
        })
    }

    /// Find the open draft of a course.
    pub fn by_course(dbconn: &Connection, course: Uuid)
    -> Result<CourseDraft, FindDraftError> {
        course_drafts::table
            .filter(course_drafts::course.eq(course))
            .get_result::<db::CourseDraft>(dbconn)
            .optional()?
            .ok_or(FindDraftError::NotFound)
            .map(CourseDraft::from_db)
    }

    /// Find a course draft by ID.
    pub fn by_id(dbconn: &Connection, id: i32)
    -> Result<CourseDraft, FindDraftError> {
        course_drafts::table
            .filter(course_drafts::id.eq(id))
            .get_result::<db::CourseDraft>(dbconn)
            .optional()?
            .ok_or(FindDraftError::NotFound)
            .map(CourseDraft::from_db)
    }

    /// Get ID of this draft.
    pub fn id(&self) -> i32 {
        self.data.id
    }

    /// Get ID of the course this is a draft of.
    pub fn course(&self) -> Uuid {
        self.data.course
    }

    /// Get the lifecycle state of this draft.
    pub fn status(&self) -> DraftStatus {
        self.data.status
    }

    /// Get the public portion of this draft's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            course: self.data.course,
            status: self.data.status,
            title: self.data.title.clone(),
            description: self.data.description.clone(),
        }
    }

    /// Change the draft value of the course's title.
    pub fn set_title(&mut self, dbconn: &Connection, actor: Actor, title: &str)
    -> Result<(), EditDraftError> {
        dbconn.transaction(|| {
            let row = edit_context(dbconn, self.data.id, actor)?;

            self.data = diesel::update(&row)
                .set(course_drafts::title.eq(title))
                .get_result::<db::CourseDraft>(dbconn)?;

            self.refresh(dbconn).map_err(Into::into)
        })
    }

    /// Change the draft value of the course's description.
    pub fn set_description(
        &mut self,
        dbconn: &Connection,
        actor: Actor,
        description: &str,
    ) -> Result<(), EditDraftError> {
        dbconn.transaction(|| {
            let row = edit_context(dbconn, self.data.id, actor)?;

            self.data = diesel::update(&row)
                .set(course_drafts::description.eq(description))
                .get_result::<db::CourseDraft>(dbconn)?;

            self.refresh(dbconn).map_err(Into::into)
        })
    }

    /// Re-record course-level field differences.
    fn refresh(&self, dbconn: &Connection) -> Result<(), DbError> {
        let published = courses::table
            .filter(courses::id.eq(self.data.course))
            .get_result::<db::Course>(dbconn)?;

        let changes = change::diff(
            &fields(&published.title, &published.description),
            &fields(&self.data.title, &self.data.description),
        );

        change::record(
            dbconn, self.data.id, EntityKind::Course, self.data.id, &changes)
    }

    /// Does this draft carry any net changes against the published tree?
    pub fn has_changes(&self, dbconn: &Connection) -> Result<bool, DbError> {
        let course: i64 = draft_changes::table
            .filter(draft_changes::draft.eq(self.data.id)
                .and(draft_changes::entity.eq(EntityKind::Course)))
            .count()
            .get_result(dbconn)?;
        if course > 0 {
            return Ok(true);
        }

        let sections: i64 = section_drafts::table
            .filter(section_drafts::draft.eq(self.data.id)
                .and(section_drafts::change.ne(ChangeKind::Unchanged)))
            .count()
            .get_result(dbconn)?;
        if sections > 0 {
            return Ok(true);
        }

        let lessons: i64 = lesson_drafts::table
            .filter(lesson_drafts::draft.eq(self.data.id)
                .and(lesson_drafts::change.ne(ChangeKind::Unchanged)))
            .count()
            .get_result(dbconn)?;
        if lessons > 0 {
            return Ok(true);
        }

        let payloads: i64 = content_drafts::table
            .filter(content_drafts::draft.eq(self.data.id)
                .and(content_drafts::change.ne(ChangeKind::Unchanged)))
            .count()
            .get_result(dbconn)?;

        Ok(payloads > 0)
    }

    /// Submit a course's draft for moderation.
    ///
    /// Fails if the draft is not open for editing or carries no net
    /// changes; a failed submit mutates nothing.
    pub fn submit(dbconn: &Connection, course: Uuid, actor: Actor)
    -> Result<CourseDraft, SubmitDraftError> {
        dbconn.transaction(|| {
            lock_course(dbconn, course)?
                .ok_or(SubmitDraftError::NotFound)?;

            let data = course_drafts::table
                .filter(course_drafts::course.eq(course))
                .get_result::<db::CourseDraft>(dbconn)
                .optional()?
                .ok_or(SubmitDraftError::NotFound)?;

            if data.status != DraftStatus::Draft {
                return Err(SubmitDraftError::BadStatus(data.status));
            }

            let draft = CourseDraft::from_db(data);
            if !draft.has_changes(dbconn)? {
                return Err(SubmitDraftError::NoChanges);
            }

            let data = diesel::update(&draft.data)
                .set((
                    course_drafts::status.eq(DraftStatus::Pending),
                    course_drafts::updated.eq(diesel::dsl::now),
                ))
                .get_result::<db::CourseDraft>(dbconn)?;

            events::store(dbconn, actor, &DraftSubmitted { course }.into())?;

            Ok(CourseDraft::from_db(data))
        })
    }

    /// Approve a course's pending draft, merging it into the published
    /// tree and purging the draft subtree.
    ///
    /// The per-course lock is held across the whole merge, so no concurrent
    /// edit can interleave with it; on any merge failure the transaction
    /// rolls back every published write and the draft remains `pending`.
    pub fn approve(dbconn: &Connection, course: Uuid, actor: Actor)
    -> Result<(), ApproveDraftError> {
        dbconn.transaction(|| {
            lock_course(dbconn, course)?
                .ok_or(ApproveDraftError::NotFound)?;

            let data = course_drafts::table
                .filter(course_drafts::course.eq(course))
                .get_result::<db::CourseDraft>(dbconn)
                .optional()?
                .ok_or(ApproveDraftError::NotFound)?;

            if data.status != DraftStatus::Pending {
                return Err(ApproveDraftError::BadStatus(data.status));
            }

            merge::apply(dbconn, &data)?;

            events::store(dbconn, actor, &DraftApproved { course }.into())?;

            Ok(())
        })
    }

    /// Reject a course's pending draft.
    ///
    /// The draft subtree is retained so the author can revise and resubmit;
    /// the first subsequent edit reopens the draft.
    pub fn reject(
        dbconn: &Connection,
        course: Uuid,
        actor: Actor,
        reason: Option<&str>,
    ) -> Result<CourseDraft, RejectDraftError> {
        dbconn.transaction(|| {
            lock_course(dbconn, course)?
                .ok_or(RejectDraftError::NotFound)?;

            let data = course_drafts::table
                .filter(course_drafts::course.eq(course))
                .get_result::<db::CourseDraft>(dbconn)
                .optional()?
                .ok_or(RejectDraftError::NotFound)?;

            if data.status != DraftStatus::Pending {
                return Err(RejectDraftError::BadStatus(data.status));
            }

            let data = diesel::update(&data)
                .set((
                    course_drafts::status.eq(DraftStatus::Rejected),
                    course_drafts::updated.eq(diesel::dsl::now),
                ))
                .get_result::<db::CourseDraft>(dbconn)?;

            events::store(dbconn, actor, &DraftRejected {
                course,
                reason: reason.map(str::to_owned),
            }.into())?;

            Ok(CourseDraft::from_db(data))
        })
    }

    /// Discard a course's draft entirely, cascading over the whole subtree.
    ///
    /// Allowed from any non-terminal state. Cannot interrupt an in-flight
    /// approval: the per-course lock serializes the two, and once the
    /// approval has committed there is no draft left to cancel.
    pub fn cancel(dbconn: &Connection, course: Uuid, actor: Actor)
    -> Result<(), CancelDraftError> {
        dbconn.transaction(|| {
            lock_course(dbconn, course)?
                .ok_or(CancelDraftError::NotFound)?;

            let data = course_drafts::table
                .filter(course_drafts::course.eq(course))
                .get_result::<db::CourseDraft>(dbconn)
                .optional()?
                .ok_or(CancelDraftError::NotFound)?;

            gc::purge_draft(dbconn, data.id)?;
            diesel::delete(&data).execute(dbconn)?;

            events::store(dbconn, actor, &DraftCanceled { course }.into())?;

            Ok(())
        })
    }

    /// Get the ordered change log of this draft.
    ///
    /// Entities appear in draft order — course first, then sections,
    /// lessons and content payloads — each with its classification and the
    /// recorded differences of its fields.
    pub fn change_log(&self, dbconn: &Connection)
    -> Result<Vec<ChangeLogEntry>, DbError> {
        let rows = draft_changes::table
            .filter(draft_changes::draft.eq(self.data.id))
            .order_by(draft_changes::id.asc())
            .get_results::<db::DraftChange>(dbconn)?;

        // Rows of one entity are always rewritten together, so they are
        // contiguous in insertion order.
        let grouped = rows.into_iter()
            .group_by(|row| (row.entity, row.entity_id));
        let mut recorded = HashMap::new();
        for ((entity, entity_id), group) in &grouped {
            recorded.insert(
                (entity, entity_id),
                group.map(change::from_row).collect::<Vec<_>>(),
            );
        }

        let mut entries = Vec::new();

        if let Some(fields) = recorded.remove(
            &(EntityKind::Course, self.data.id))
        {
            if !fields.is_empty() {
                entries.push(ChangeLogEntry {
                    entity: EntityKind::Course,
                    entity_id: self.data.id,
                    change: ChangeKind::Modified,
                    fields,
                });
            }
        }

        let sections = section_drafts::table
            .filter(section_drafts::draft.eq(self.data.id))
            .order_by((section_drafts::index.asc(), section_drafts::id.asc()))
            .get_results::<db::SectionDraft>(dbconn)?;
        for section in sections {
            if section.change == ChangeKind::Unchanged {
                continue;
            }
            entries.push(ChangeLogEntry {
                entity: EntityKind::Section,
                entity_id: section.id,
                change: section.change,
                fields: recorded.remove(&(EntityKind::Section, section.id))
                    .unwrap_or_default(),
            });
        }

        let lessons = lesson_drafts::table
            .filter(lesson_drafts::draft.eq(self.data.id))
            .order_by((lesson_drafts::index.asc(), lesson_drafts::id.asc()))
            .get_results::<db::LessonDraft>(dbconn)?;
        for lesson in lessons {
            if lesson.change == ChangeKind::Unchanged {
                continue;
            }
            entries.push(ChangeLogEntry {
                entity: EntityKind::Lesson,
                entity_id: lesson.id,
                change: lesson.change,
                fields: recorded.remove(&(EntityKind::Lesson, lesson.id))
                    .unwrap_or_default(),
            });
        }

        let payloads = content_drafts::table
            .filter(content_drafts::draft.eq(self.data.id))
            .order_by(content_drafts::id.asc())
            .get_results::<db::ContentDraft>(dbconn)?;
        for payload in payloads {
            if payload.change == ChangeKind::Unchanged {
                continue;
            }
            entries.push(ChangeLogEntry {
                entity: EntityKind::Content,
                entity_id: payload.id,
                change: payload.change,
                fields: recorded.remove(&(EntityKind::Content, payload.id))
                    .unwrap_or_default(),
            });
        }

        Ok(entries)
    }

    /// Get the ordered status history of a course's drafts, derived from
    /// the recorded lifecycle events. Survives the draft's purge.
    pub fn status_history(dbconn: &Connection, course: Uuid)
    -> Result<Vec<DraftStatus>, DbError> {
        Ok(events::kinds_for_course(dbconn, course)?
            .into_iter()
            .filter_map(|kind| match kind.as_str() {
                "created" | "reopened" => Some(DraftStatus::Draft),
                "submitted" => Some(DraftStatus::Pending),
                "approved" => Some(DraftStatus::Approved),
                "rejected" => Some(DraftStatus::Rejected),
                _ => None,
            })
            .collect())
    }
}

/// Acquire the per-course exclusive section.
///
/// Every mutating operation — edits as well as lifecycle transitions — runs
/// in a transaction that first takes a row lock on the published course, so
/// all of them are serialized per course while readers of the published
/// tree stay unblocked.
pub(crate) fn lock_course(dbconn: &Connection, course: Uuid)
-> Result<Option<db::Course>, DbError> {
    courses::table
        .filter(courses::id.eq(course))
        .for_update()
        .get_result::<db::Course>(dbconn)
        .optional()
}

/// Begin a mutating edit against a draft.
///
/// Takes the per-course lock, verifies the draft is open for editing
/// (reopening a rejected draft on the way), and stamps the edit time.
/// Returns the up-to-date draft row.
pub(crate) fn edit_context(dbconn: &Connection, draft: i32, actor: Actor)
-> Result<db::CourseDraft, EditDraftError> {
    let row = course_drafts::table
        .filter(course_drafts::id.eq(draft))
        .get_result::<db::CourseDraft>(dbconn)
        .optional()?
        .ok_or(EditDraftError::NotFound)?;

    lock_course(dbconn, row.course)?
        .ok_or(EditDraftError::NotFound)?;

    // Re-fetch under the lock; the draft may have transitioned (or been
    // purged) while we were waiting for it.
    let mut row = course_drafts::table
        .filter(course_drafts::id.eq(draft))
        .get_result::<db::CourseDraft>(dbconn)
        .optional()?
        .ok_or(EditDraftError::NotFound)?;

    match row.status {
        DraftStatus::Draft => {}
        DraftStatus::Rejected => {
            diesel::update(&row)
                .set(course_drafts::status.eq(DraftStatus::Draft))
                .execute(dbconn)?;
            row.status = DraftStatus::Draft;

            events::store(
                dbconn, actor, &DraftReopened { course: row.course }.into())?;
        }
        DraftStatus::Pending | DraftStatus::Approved => {
            return Err(EditDraftError::Pending);
        }
    }

    let row = diesel::update(&row)
        .set(course_drafts::updated.eq(diesel::dsl::now))
        .get_result::<db::CourseDraft>(dbconn)?;

    Ok(row)
}

#[derive(Debug, Fail)]
pub enum CreateDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No such course.
    #[fail(display = "No such course")]
    CourseNotFound,
}

impl_from! { for CreateDraftError ;
    DbError => |e| CreateDraftError::Database(e),
}

#[derive(Debug, Fail)]
pub enum FindDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No draft found matching given criteria.
    #[fail(display = "No such draft")]
    NotFound,
}

impl_from! { for FindDraftError ;
    DbError => |e| FindDraftError::Database(e),
}

#[derive(Debug, Fail)]
pub enum EditDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The draft (or its course) does not exist.
    #[fail(display = "No such draft")]
    NotFound,
    /// The draft is awaiting moderation and cannot be edited.
    #[fail(display = "Draft is pending moderation and cannot be edited")]
    Pending,
}

impl_from! { for EditDraftError ;
    DbError => |e| EditDraftError::Database(e),
}

#[derive(Debug, Fail)]
pub enum SubmitDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The draft (or its course) does not exist.
    #[fail(display = "No such draft")]
    NotFound,
    /// The draft is not open for editing.
    #[fail(display = "Draft cannot be submitted from status {}", _0)]
    BadStatus(DraftStatus),
    /// Every node of the draft is unchanged; there is nothing to moderate.
    #[fail(display = "Draft has no changes to submit")]
    NoChanges,
}

impl_from! { for SubmitDraftError ;
    DbError => |e| SubmitDraftError::Database(e),
}

#[derive(Debug, Fail)]
pub enum ApproveDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The draft (or its course) does not exist.
    #[fail(display = "No such draft")]
    NotFound,
    /// The draft is not awaiting moderation.
    #[fail(display = "Draft cannot be approved from status {}", _0)]
    BadStatus(DraftStatus),
    /// The merge could not be applied; every published write was rolled
    /// back and the draft remains pending.
    #[fail(display = "Could not merge draft: {}", _0)]
    Merge(#[cause] MergeError),
}

impl_from! { for ApproveDraftError ;
    DbError => |e| ApproveDraftError::Database(e),
    MergeError => |e| match e {
        MergeError::Database(e) => ApproveDraftError::Database(e),
        e => ApproveDraftError::Merge(e),
    },
}

#[derive(Debug, Fail)]
pub enum RejectDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The draft (or its course) does not exist.
    #[fail(display = "No such draft")]
    NotFound,
    /// The draft is not awaiting moderation.
    #[fail(display = "Draft cannot be rejected from status {}", _0)]
    BadStatus(DraftStatus),
}

impl_from! { for RejectDraftError ;
    DbError => |e| RejectDraftError::Database(e),
}

#[derive(Debug, Fail)]
pub enum CancelDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The draft (or its course) does not exist.
    #[fail(display = "No such draft")]
    NotFound,
}

impl_from! { for CancelDraftError ;
    DbError => |e| CancelDraftError::Database(e),
}
