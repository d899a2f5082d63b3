use diesel::{
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::{lessons, sections},
};
use super::{
    content::FindContentError,
    lesson::{Lesson, PublicData as LessonData},
};

/// A published section; an ordered group of lessons within a course.
#[derive(Debug)]
pub struct Section {
    data: db::Section,
}

/// A subset of section's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: Uuid,
    pub course: Uuid,
    pub title: String,
    pub index: i32,
}

/// A section together with its lessons.
#[derive(Debug, Serialize)]
pub struct Tree {
    pub id: Uuid,
    pub title: String,
    pub index: i32,
    pub lessons: Vec<LessonData>,
}

impl Section {
    /// Construct `Section` from its database counterpart.
    pub(crate) fn from_db(data: db::Section) -> Section {
        Section { data }
    }

    /// Find a section by ID.
    pub fn by_id(dbconn: &Connection, id: Uuid) -> Result<Section, FindSectionError> {
        sections::table
            .filter(sections::id.eq(id))
            .get_result::<db::Section>(dbconn)
            .optional()?
            .ok_or(FindSectionError::NotFound)
            .map(Section::from_db)
    }

    /// Get lessons of this section, in section order.
    pub fn lessons(&self, dbconn: &Connection) -> Result<Vec<Lesson>, DbError> {
        lessons::table
            .filter(lessons::section.eq(self.data.id))
            .order_by((lessons::index.asc(), lessons::id.asc()))
            .get_results::<db::Lesson>(dbconn)
            .map(|v| v.into_iter().map(Lesson::from_db).collect())
    }

    /// Get the public portion of this section's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            course: self.data.course,
            title: self.data.title.clone(),
            index: self.data.index,
        }
    }

    /// Get this section and its lessons as a tree.
    pub fn get_tree(&self, dbconn: &Connection) -> Result<Tree, FindContentError> {
        let lessons = self.lessons(dbconn)?
            .into_iter()
            .map(|lesson| lesson.get_public(dbconn))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Tree {
            id: self.data.id,
            title: self.data.title.clone(),
            index: self.data.index,
            lessons,
        })
    }
}

impl std::ops::Deref for Section {
    type Target = db::Section;

    fn deref(&self) -> &db::Section {
        &self.data
    }
}

#[derive(Debug, Fail)]
pub enum FindSectionError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No section found matching given criteria.
    #[fail(display = "No such section")]
    NotFound,
}

impl_from! { for FindSectionError ;
    DbError => |e| FindSectionError::Database(e),
}
