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
    schema::{section_drafts, sections},
    types::{ChangeKind, EntityKind},
};
use crate::events::Actor;
use super::{CourseDraft, EditDraftError, change, change::Value, gc};

/// Draft of a section.
///
/// Carries either an edit of a published section (`section` set) or a
/// section that exists only in the draft.
#[derive(Debug)]
pub struct SectionDraft {
    data: db::SectionDraft,
}

/// A subset of section draft's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: i32,
    /// ID of the published counterpart, if one exists.
    pub section: Option<Uuid>,
    pub title: String,
    pub index: i32,
    pub change: ChangeKind,
}

/// Tracked fields of a section, as seen by the change tracker.
fn fields(title: &str, index: i32) -> Vec<(&'static str, Value)> {
    vec![
        ("title", Value::String(title.to_owned())),
        ("index", Value::Number(i64::from(index))),
    ]
}

impl SectionDraft {
    /// Construct `SectionDraft` from its database counterpart.
    pub(crate) fn from_db(data: db::SectionDraft) -> SectionDraft {
        SectionDraft { data }
    }

    /// Find a section draft by ID.
    pub fn by_id(dbconn: &Connection, id: i32)
    -> Result<SectionDraft, FindSectionDraftError> {
        section_drafts::table
            .filter(section_drafts::id.eq(id))
            .get_result::<db::SectionDraft>(dbconn)
            .optional()?
            .ok_or(FindSectionDraftError::NotFound)
            .map(SectionDraft::from_db)
    }

    /// Get all section drafts of a course draft, in course order.
    pub fn all_of(dbconn: &Connection, draft: &CourseDraft)
    -> Result<Vec<SectionDraft>, DbError> {
        section_drafts::table
            .filter(section_drafts::draft.eq(draft.id()))
            .order_by((section_drafts::index.asc(), section_drafts::id.asc()))
            .get_results::<db::SectionDraft>(dbconn)
            .map(|v| v.into_iter().map(SectionDraft::from_db).collect())
    }

    /// Add a new section to a draft.
    pub fn create(
        dbconn: &Connection,
        draft: &CourseDraft,
        actor: Actor,
        title: &str,
        index: i32,
    ) -> Result<SectionDraft, EditSectionError> {
        dbconn.transaction(|| {
            let draft = super::edit_context(dbconn, draft.id(), actor)?;

            let (kind, changes) = change::classify(None, &fields(title, index));

            let row = diesel::insert_into(section_drafts::table)
                .values(&db::NewSectionDraft {
                    draft: draft.id,
                    section: None,
                    title,
                    index,
                    change: kind,
                })
                .get_result::<db::SectionDraft>(dbconn)?;

            change::record(
                dbconn, draft.id, EntityKind::Section, row.id, &changes)?;

            Ok(SectionDraft::from_db(row))
        })
    }

    /// Get the draft of a published section, materializing it if this is the
    /// first edit to target it.
    ///
    /// Idempotent: a second call returns the existing row unmodified.
    pub fn for_published(
        dbconn: &Connection,
        draft: &CourseDraft,
        actor: Actor,
        section: Uuid,
    ) -> Result<SectionDraft, EditSectionError> {
        dbconn.transaction(|| {
            let draft = super::edit_context(dbconn, draft.id(), actor)?;

            let existing = section_drafts::table
                .filter(section_drafts::draft.eq(draft.id)
                    .and(section_drafts::section.eq(section)))
                .get_result::<db::SectionDraft>(dbconn)
                .optional()?;

            if let Some(data) = existing {
                return Ok(SectionDraft::from_db(data));
            }

            let published = sections::table
                .filter(sections::id.eq(section))
                .get_result::<db::Section>(dbconn)
                .optional()?
                .ok_or(EditSectionError::NotFound)?;

            if published.course != draft.course {
                return Err(EditSectionError::NotFound);
            }

            let row = diesel::insert_into(section_drafts::table)
                .values(&db::NewSectionDraft {
                    draft: draft.id,
                    section: Some(section),
                    title: &published.title,
                    index: published.index,
                    change: ChangeKind::Unchanged,
                })
                .get_result::<db::SectionDraft>(dbconn)?;

            Ok(SectionDraft::from_db(row))
        })
    }

    /// Get ID of this section draft.
    pub fn id(&self) -> i32 {
        self.data.id
    }

    /// Get ID of the course draft owning this section draft.
    pub fn draft_id(&self) -> i32 {
        self.data.draft
    }

    /// Get the classification of this section draft.
    pub fn change(&self) -> ChangeKind {
        self.data.change
    }

    /// Get the public portion of this section draft's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            section: self.data.section,
            title: self.data.title.clone(),
            index: self.data.index,
            change: self.data.change,
        }
    }

    /// Change title of this section draft.
    pub fn set_title(&mut self, dbconn: &Connection, actor: Actor, title: &str)
    -> Result<(), EditSectionError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            self.data = diesel::update(&self.data)
                .set(section_drafts::title.eq(title))
                .get_result::<db::SectionDraft>(dbconn)?;

            self.refresh(dbconn)
        })
    }

    /// Move this section draft to another position within the course.
    pub fn set_index(&mut self, dbconn: &Connection, actor: Actor, index: i32)
    -> Result<(), EditSectionError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            self.data = diesel::update(&self.data)
                .set(section_drafts::index.eq(index))
                .get_result::<db::SectionDraft>(dbconn)?;

            self.refresh(dbconn)
        })
    }

    /// Reclassify this section draft against its published counterpart.
    fn refresh(&mut self, dbconn: &Connection) -> Result<(), EditSectionError> {
        self.data = reclassify(dbconn, self.data.clone())?;
        Ok(())
    }

    /// Delete this section draft.
    ///
    /// A section that exists only in the draft is removed outright; a
    /// published-backed one is flagged for removal so the merge can apply
    /// the deletion. Either way all owned lesson drafts (and, transitively,
    /// their content drafts) are removed first.
    pub fn delete(self, dbconn: &Connection, actor: Actor)
    -> Result<(), EditSectionError> {
        dbconn.transaction(|| {
            super::edit_context(dbconn, self.data.draft, actor)?;

            gc::collect_section(dbconn, &self.data)?;

            if self.data.change == ChangeKind::New {
                diesel::delete(&self.data).execute(dbconn)?;
            } else {
                diesel::update(&self.data)
                    .set(section_drafts::change.eq(ChangeKind::Deleted))
                    .execute(dbconn)?;
            }

            Ok(())
        })
    }
}

/// Recompute the classification of a section draft row from its current
/// fields.
///
/// Also serves as the revival path: a row flagged `deleted` that is edited
/// (or has a lesson added back under it) is reclassified from its actual
/// diff, clearing the flag.
pub(crate) fn reclassify(dbconn: &Connection, row: db::SectionDraft)
-> Result<db::SectionDraft, DbError> {
    let published = match row.section {
        Some(id) => sections::table
            .filter(sections::id.eq(id))
            .get_result::<db::Section>(dbconn)
            .optional()?
            .map(|section| fields(&section.title, section.index)),
        None => None,
    };

    let (kind, changes) = change::classify(
        published.as_ref().map(Vec::as_slice),
        &fields(&row.title, row.index),
    );

    let row = diesel::update(&row)
        .set(section_drafts::change.eq(kind))
        .get_result::<db::SectionDraft>(dbconn)?;

    change::record(dbconn, row.draft, EntityKind::Section, row.id, &changes)?;

    Ok(row)
}

#[derive(Debug, Fail)]
pub enum FindSectionDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No section draft found matching given criteria.
    #[fail(display = "No such section draft")]
    NotFound,
}

impl_from! { for FindSectionDraftError ;
    DbError => |e| FindSectionDraftError::Database(e),
}

#[derive(Debug, Fail)]
pub enum EditSectionError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The owning draft cannot be edited.
    #[fail(display = "{}", _0)]
    Draft(#[cause] EditDraftError),
    /// No such section within this draft's course.
    #[fail(display = "No such section")]
    NotFound,
}

impl_from! { for EditSectionError ;
    DbError => |e| EditSectionError::Database(e),
    EditDraftError => |e| match e {
        EditDraftError::Database(e) => EditSectionError::Database(e),
        e => EditSectionError::Draft(e),
    },
}
