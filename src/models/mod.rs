pub mod content;
pub mod course;
pub mod draft;
pub mod lesson;
pub mod section;

pub use self::{
    content::Content,
    course::Course,
    draft::{ContentDraft, CourseDraft, LessonDraft, SectionDraft},
    lesson::Lesson,
    section::Section,
};
