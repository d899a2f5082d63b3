use diesel::{
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;
use serde_json::Value as Json;

use crate::db::{
    Connection,
    models as db,
    schema::contents,
    types::ContentKind,
};
use super::draft::change::Value;

/// Typed payload of a lesson.
///
/// Storage keeps a single payload table with per-kind columns; rows are only
/// read and written through this enum, so callers can never observe (or
/// construct) a payload whose populated columns disagree with its
/// discriminant.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Data {
    Video {
        url: String,
        /// Length of the video, in seconds.
        duration: i32,
    },
    Material {
        url: String,
        mime: String,
    },
    Quiz {
        data: Json,
    },
}

impl Data {
    /// Discriminant of this payload.
    pub fn kind(&self) -> ContentKind {
        match *self {
            Data::Video { .. } => ContentKind::Video,
            Data::Material { .. } => ContentKind::Material,
            Data::Quiz { .. } => ContentKind::Quiz,
        }
    }

    /// Rebuild a payload from its storage columns.
    pub(crate) fn from_columns(
        kind: ContentKind,
        url: Option<String>,
        mime: Option<String>,
        duration: Option<i32>,
        data: Option<Json>,
    ) -> Result<Data, InvalidContent> {
        match kind {
            ContentKind::Video => match (url, duration) {
                (Some(url), Some(duration)) => Ok(Data::Video { url, duration }),
                _ => Err(InvalidContent { kind }),
            },
            ContentKind::Material => match (url, mime) {
                (Some(url), Some(mime)) => Ok(Data::Material { url, mime }),
                _ => Err(InvalidContent { kind }),
            },
            ContentKind::Quiz => match data {
                Some(data) => Ok(Data::Quiz { data }),
                None => Err(InvalidContent { kind }),
            },
        }
    }

    /// Decompose this payload into its storage columns.
    pub(crate) fn into_columns(self)
    -> (ContentKind, Option<String>, Option<String>, Option<i32>, Option<Json>) {
        match self {
            Data::Video { url, duration } =>
                (ContentKind::Video, Some(url), None, Some(duration), None),
            Data::Material { url, mime } =>
                (ContentKind::Material, Some(url), Some(mime), None, None),
            Data::Quiz { data } =>
                (ContentKind::Quiz, None, None, None, Some(data)),
        }
    }

    /// Tracked fields of this payload, as seen by the change tracker.
    pub(crate) fn fields(&self) -> Vec<(&'static str, Value)> {
        match *self {
            Data::Video { ref url, duration } => vec![
                ("url", Value::String(url.clone())),
                ("duration", Value::Number(i64::from(duration))),
            ],
            Data::Material { ref url, ref mime } => vec![
                ("url", Value::String(url.clone())),
                ("mime", Value::String(mime.clone())),
            ],
            // Quiz data is free-form JSON; the tracker treats it as a single
            // opaque field.
            Data::Quiz { ref data } => vec![
                ("data", Value::String(data.to_string())),
            ],
        }
    }
}

/// A published content payload.
#[derive(Debug)]
pub struct Content {
    id: i32,
    data: Data,
}

impl Content {
    /// Construct `Content` from its database counterpart.
    pub(crate) fn from_db(row: db::Content) -> Result<Content, InvalidContent> {
        let db::Content { id, kind, url, mime, duration, data } = row;

        Ok(Content {
            id,
            data: Data::from_columns(kind, url, mime, duration, data)?,
        })
    }

    /// Find a published content payload by ID.
    pub fn by_id(dbconn: &Connection, id: i32) -> Result<Content, FindContentError> {
        contents::table
            .filter(contents::id.eq(id))
            .get_result::<db::Content>(dbconn)
            .optional()?
            .ok_or(FindContentError::NotFound)
            .and_then(|row| Content::from_db(row).map_err(Into::into))
    }

    /// Get ID of this content.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Get the typed payload.
    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Get the public portion of this content's data.
    pub fn get_public(&self) -> Data {
        self.data.clone()
    }
}

/// Payload columns of a row do not match its discriminant.
#[derive(Debug, Fail)]
#[fail(display = "Content payload does not match its kind {}", kind)]
pub struct InvalidContent {
    pub kind: ContentKind,
}

#[derive(Debug, Fail)]
pub enum FindContentError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No content found matching given criteria.
    #[fail(display = "No such content")]
    NotFound,
    /// The stored payload is inconsistent with its discriminant.
    #[fail(display = "{}", _0)]
    Invalid(#[cause] InvalidContent),
}

impl_from! { for FindContentError ;
    DbError => |e| FindContentError::Database(e),
    InvalidContent => |e| FindContentError::Invalid(e),
}
