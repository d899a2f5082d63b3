use diesel::{
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::lessons,
};
use super::content::{Content, Data, FindContentError};

/// A published lesson; a leaf of the course tree carrying typed content.
#[derive(Debug)]
pub struct Lesson {
    data: db::Lesson,
}

/// A subset of lesson's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: Uuid,
    pub section: Uuid,
    pub title: String,
    pub index: i32,
    pub free_preview: bool,
    pub content: Data,
}

impl Lesson {
    /// Construct `Lesson` from its database counterpart.
    pub(crate) fn from_db(data: db::Lesson) -> Lesson {
        Lesson { data }
    }

    /// Find a lesson by ID.
    pub fn by_id(dbconn: &Connection, id: Uuid) -> Result<Lesson, FindLessonError> {
        lessons::table
            .filter(lessons::id.eq(id))
            .get_result::<db::Lesson>(dbconn)
            .optional()?
            .ok_or(FindLessonError::NotFound)
            .map(Lesson::from_db)
    }

    /// Get ID of this lesson.
    pub fn id(&self) -> Uuid {
        self.data.id
    }

    /// Get this lesson's published content.
    pub fn content(&self, dbconn: &Connection) -> Result<Content, FindContentError> {
        Content::by_id(dbconn, self.data.content)
    }

    /// Get the public portion of this lesson's data.
    pub fn get_public(&self, dbconn: &Connection)
    -> Result<PublicData, FindContentError> {
        Ok(PublicData {
            id: self.data.id,
            section: self.data.section,
            title: self.data.title.clone(),
            index: self.data.index,
            free_preview: self.data.free_preview,
            content: self.content(dbconn)?.get_public(),
        })
    }
}

impl std::ops::Deref for Lesson {
    type Target = db::Lesson;

    fn deref(&self) -> &db::Lesson {
        &self.data
    }
}

#[derive(Debug, Fail)]
pub enum FindLessonError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No lesson found matching given criteria.
    #[fail(display = "No such lesson")]
    NotFound,
}

impl_from! { for FindLessonError ;
    DbError => |e| FindLessonError::Database(e),
}
