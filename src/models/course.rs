use diesel::{
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::{courses, sections},
};
use super::{
    content::FindContentError,
    section::{Section, Tree as SectionTree},
};

/// A published course. The root of the externally visible content tree.
#[derive(Debug)]
pub struct Course {
    data: db::Course,
}

/// A subset of course's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: Uuid,
    pub title: String,
    pub description: String,
}

/// Complete published contents of a course.
#[derive(Debug, Serialize)]
pub struct Tree {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub sections: Vec<SectionTree>,
}

impl Course {
    /// Construct `Course` from its database counterpart.
    pub(crate) fn from_db(data: db::Course) -> Course {
        Course { data }
    }

    /// Get all courses.
    pub fn all(dbconn: &Connection) -> Result<Vec<Course>, DbError> {
        courses::table
            .get_results::<db::Course>(dbconn)
            .map(|v| v.into_iter().map(Course::from_db).collect())
    }

    /// Find a course by ID.
    pub fn by_id(dbconn: &Connection, id: Uuid) -> Result<Course, FindCourseError> {
        courses::table
            .filter(courses::id.eq(id))
            .get_result::<db::Course>(dbconn)
            .optional()?
            .ok_or(FindCourseError::NotFound)
            .map(Course::from_db)
    }

    /// Create a new course.
    ///
    /// This is the seed primitive of the published store; everything below a
    /// course enters the published tree only through an approved draft.
    pub fn create(dbconn: &Connection, title: &str, description: &str)
    -> Result<Course, DbError> {
        diesel::insert_into(courses::table)
            .values(&db::NewCourse {
                id: Uuid::new_v4(),
                title,
                description,
            })
            .get_result::<db::Course>(dbconn)
            .map(Course::from_db)
    }

    /// Get ID of this course.
    pub fn id(&self) -> Uuid {
        self.data.id
    }

    /// Get the public portion of this course's data.
    pub fn get_public(&self) -> PublicData {
        PublicData {
            id: self.data.id,
            title: self.data.title.clone(),
            description: self.data.description.clone(),
        }
    }

    /// Get sections of this course, in course order.
    pub fn sections(&self, dbconn: &Connection) -> Result<Vec<Section>, DbError> {
        sections::table
            .filter(sections::course.eq(self.data.id))
            .order_by((sections::index.asc(), sections::id.asc()))
            .get_results::<db::Section>(dbconn)
            .map(|v| v.into_iter().map(Section::from_db).collect())
    }

    /// Get published contents of this course as a tree.
    pub fn get_tree(&self, dbconn: &Connection) -> Result<Tree, FindContentError> {
        let sections = self.sections(dbconn)?
            .into_iter()
            .map(|section| section.get_tree(dbconn))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Tree {
            id: self.data.id,
            title: self.data.title.clone(),
            description: self.data.description.clone(),
            sections,
        })
    }
}

impl std::ops::Deref for Course {
    type Target = db::Course;

    fn deref(&self) -> &db::Course {
        &self.data
    }
}

#[derive(Debug, Fail)]
pub enum FindCourseError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No course found matching given criteria.
    #[fail(display = "No such course")]
    NotFound,
}

impl_from! { for FindCourseError ;
    DbError => |e| FindCourseError::Database(e),
}
