use diesel::{
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;

use crate::db::{
    Connection,
    models as db,
    schema::{content_drafts, contents},
    types::{ChangeKind, EntityKind},
};
use crate::models::content::{Data, InvalidContent};
use super::change;

/// Draft of a lesson's content payload.
///
/// A content draft is owned by exactly one lesson draft and never outlives
/// it: the cascade sweep removes it together with its owner.
#[derive(Debug)]
pub struct ContentDraft {
    data: db::ContentDraft,
}

/// A subset of content draft's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: i32,
    /// ID of the published counterpart, if one exists.
    pub content: Option<i32>,
    pub change: ChangeKind,
    pub data: Data,
}

impl ContentDraft {
    /// Construct `ContentDraft` from its database counterpart.
    pub(crate) fn from_db(data: db::ContentDraft) -> ContentDraft {
        ContentDraft { data }
    }

    /// Find a content draft by ID.
    pub fn by_id(dbconn: &Connection, id: i32)
    -> Result<ContentDraft, FindContentDraftError> {
        content_drafts::table
            .filter(content_drafts::id.eq(id))
            .get_result::<db::ContentDraft>(dbconn)
            .optional()?
            .ok_or(FindContentDraftError::NotFound)
            .map(ContentDraft::from_db)
    }

    /// Create a content draft for a lesson draft.
    ///
    /// `published` carries the published counterpart, if the owning lesson
    /// was materialized from the published tree; classification is computed
    /// against it before the row is persisted.
    pub(crate) fn create(
        dbconn: &Connection,
        draft: i32,
        payload: Data,
        published: Option<(i32, &Data)>,
    ) -> Result<ContentDraft, DbError> {
        let published_fields = published.map(|(_, data)| data.fields());
        let (kind, changes) = change::classify(
            published_fields.as_ref().map(Vec::as_slice),
            &payload.fields(),
        );

        let (discriminant, url, mime, duration, data) = payload.into_columns();

        let row = diesel::insert_into(content_drafts::table)
            .values(&db::NewContentDraft {
                draft,
                kind: discriminant,
                url,
                mime,
                duration,
                data,
                content: published.map(|(id, _)| id),
                change: kind,
            })
            .get_result::<db::ContentDraft>(dbconn)?;

        change::record(dbconn, draft, EntityKind::Content, row.id, &changes)?;

        Ok(ContentDraft::from_db(row))
    }

    /// Get ID of this content draft.
    pub fn id(&self) -> i32 {
        self.data.id
    }

    /// Get the classification of this content draft.
    pub fn change(&self) -> ChangeKind {
        self.data.change
    }

    /// Get the typed payload of this content draft.
    pub fn data(&self) -> Result<Data, InvalidContent> {
        Data::from_columns(
            self.data.kind,
            self.data.url.clone(),
            self.data.mime.clone(),
            self.data.duration.clone(),
            self.data.data.clone(),
        )
    }

    /// Get the public portion of this content draft's data.
    pub fn get_public(&self) -> Result<PublicData, InvalidContent> {
        Ok(PublicData {
            id: self.data.id,
            content: self.data.content,
            change: self.data.change,
            data: self.data()?,
        })
    }

    /// Replace the payload of this content draft, reclassifying it against
    /// its published counterpart.
    pub(crate) fn set_payload(&mut self, dbconn: &Connection, payload: Data)
    -> Result<(), SetPayloadError> {
        let published = match self.data.content {
            Some(id) => {
                let row = contents::table
                    .filter(contents::id.eq(id))
                    .get_result::<db::Content>(dbconn)
                    .optional()?
                    .ok_or(DbError::NotFound)?;
                Some(Data::from_columns(
                    row.kind, row.url, row.mime, row.duration, row.data)?)
            }
            None => None,
        };

        let published_fields = published.as_ref().map(Data::fields);
        let (kind, changes) = change::classify(
            published_fields.as_ref().map(Vec::as_slice),
            &payload.fields(),
        );

        let (discriminant, url, mime, duration, data) = payload.into_columns();

        self.data = diesel::update(&self.data)
            .set((
                db::ContentDraftPayload {
                    kind: discriminant,
                    url,
                    mime,
                    duration,
                    data,
                },
                content_drafts::change.eq(kind),
            ))
            .get_result::<db::ContentDraft>(dbconn)?;

        change::record(
            dbconn, self.data.draft, EntityKind::Content, self.data.id, &changes)?;

        Ok(())
    }

    /// Flag this content draft for removal together with its owning lesson.
    pub(crate) fn mark_deleted(&mut self, dbconn: &Connection)
    -> Result<(), DbError> {
        diesel::update(&self.data)
            .set(content_drafts::change.eq(ChangeKind::Deleted))
            .execute(dbconn)?;
        self.data.change = ChangeKind::Deleted;

        change::clear(
            dbconn, self.data.draft, EntityKind::Content, self.data.id)
    }
}

#[derive(Debug, Fail)]
pub enum FindContentDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No content draft found matching given criteria.
    #[fail(display = "No such content draft")]
    NotFound,
}

impl_from! { for FindContentDraftError ;
    DbError => |e| FindContentDraftError::Database(e),
}

#[derive(Debug, Fail)]
pub enum SetPayloadError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The published counterpart's stored payload is inconsistent.
    #[fail(display = "{}", _0)]
    Invalid(#[cause] InvalidContent),
}

impl_from! { for SetPayloadError ;
    DbError => |e| SetPayloadError::Database(e),
    InvalidContent => |e| SetPayloadError::Invalid(e),
}
