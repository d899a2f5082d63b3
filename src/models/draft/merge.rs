//! Projection of an approved draft into the published tables.

use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DbError},
};
use failure::Fail;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::{
        contents,
        content_drafts,
        courses,
        course_drafts,
        lessons,
        lesson_drafts,
        sections,
        section_drafts,
    },
    types::ChangeKind,
};
use super::gc;

/// Apply an approved draft to the published tables, then purge it.
///
/// Must run inside the approving transaction, with the per-course lock
/// held; the enclosing transaction is what makes the merge all-or-nothing.
/// Writes proceed in dependency order — course fields, sections, contents
/// and lessons — parents before children for upserts, children before
/// parents for deletions. Nodes classified `unchanged` produce no writes.
pub(crate) fn apply(dbconn: &Connection, draft: &db::CourseDraft)
-> Result<(), MergeError> {
    diesel::update(courses::table.filter(courses::id.eq(draft.course)))
        .set((
            courses::title.eq(&draft.title),
            courses::description.eq(&draft.description),
        ))
        .execute(dbconn)?;

    let section_rows = section_drafts::table
        .filter(section_drafts::draft.eq(draft.id))
        .order_by((section_drafts::index.asc(), section_drafts::id.asc()))
        .get_results::<db::SectionDraft>(dbconn)?;

    // Published ID of every live section draft; `new` sections are assigned
    // theirs here.
    let mut section_ids = HashMap::new();
    for section in &section_rows {
        let id = match section.change {
            ChangeKind::New => {
                let id = Uuid::new_v4();
                diesel::insert_into(sections::table)
                    .values(&db::NewSection {
                        id,
                        course: draft.course,
                        title: &section.title,
                        index: section.index,
                    })
                    .execute(dbconn)?;
                id
            }
            ChangeKind::Modified => {
                let id = section.section.ok_or(MergeError::Inconsistent)?;
                diesel::update(sections::table
                    .filter(sections::id.eq(id)))
                    .set((
                        sections::title.eq(&section.title),
                        sections::index.eq(section.index),
                    ))
                    .execute(dbconn)?;
                id
            }
            ChangeKind::Unchanged =>
                section.section.ok_or(MergeError::Inconsistent)?,
            ChangeKind::Deleted => continue,
        };
        section_ids.insert(section.id, id);
    }

    let lesson_rows = lesson_drafts::table
        .filter(lesson_drafts::draft.eq(draft.id))
        .order_by((lesson_drafts::index.asc(), lesson_drafts::id.asc()))
        .get_results::<db::LessonDraft>(dbconn)?;

    let payloads = content_drafts::table
        .filter(content_drafts::draft.eq(draft.id))
        .get_results::<db::ContentDraft>(dbconn)?
        .into_iter()
        .map(|row| (row.id, row))
        .collect::<HashMap<_, _>>();

    for lesson in &lesson_rows {
        if lesson.change == ChangeKind::Deleted {
            continue;
        }

        let section = *section_ids.get(&lesson.section_draft)
            .ok_or(MergeError::Inconsistent)?;
        let payload = payloads.get(&lesson.content)
            .ok_or(MergeError::Inconsistent)?;

        if lesson.change == ChangeKind::New {
            // Content row first: the lesson references it.
            let content = diesel::insert_into(contents::table)
                .values(&db::NewContent {
                    kind: payload.kind,
                    url: payload.url.clone(),
                    mime: payload.mime.clone(),
                    duration: payload.duration,
                    data: payload.data.clone(),
                })
                .get_result::<db::Content>(dbconn)?;

            diesel::insert_into(lessons::table)
                .values(&db::NewLesson {
                    id: Uuid::new_v4(),
                    section,
                    title: &lesson.title,
                    index: lesson.index,
                    free_preview: lesson.free_preview,
                    kind: lesson.kind,
                    content: content.id,
                })
                .execute(dbconn)?;

            continue;
        }

        let id = lesson.lesson.ok_or(MergeError::Inconsistent)?;

        if lesson.change == ChangeKind::Modified {
            diesel::update(lessons::table.filter(lessons::id.eq(id)))
                .set((
                    lessons::section.eq(section),
                    lessons::title.eq(&lesson.title),
                    lessons::index.eq(lesson.index),
                    lessons::free_preview.eq(lesson.free_preview),
                    lessons::kind.eq(lesson.kind),
                ))
                .execute(dbconn)?;
        }

        if payload.change == ChangeKind::Modified {
            let content = payload.content.ok_or(MergeError::Inconsistent)?;
            diesel::update(contents::table
                .filter(contents::id.eq(content)))
                .set(&db::ContentPayload {
                    kind: payload.kind,
                    url: payload.url.clone(),
                    mime: payload.mime.clone(),
                    duration: payload.duration,
                    data: payload.data.clone(),
                })
                .execute(dbconn)?;
        }
    }

    // Deletions, children before parents.
    for lesson in lesson_rows.iter()
        .filter(|l| l.change == ChangeKind::Deleted)
    {
        let id = lesson.lesson.ok_or(MergeError::Inconsistent)?;
        delete_published_lesson(dbconn, id)?;
    }

    for section in section_rows.iter()
        .filter(|s| s.change == ChangeKind::Deleted)
    {
        let id = section.section.ok_or(MergeError::Inconsistent)?;

        // Published lessons under this section cascade, whether or not they
        // were ever materialized in the draft.
        let owned = lessons::table
            .filter(lessons::section.eq(id))
            .get_results::<db::Lesson>(dbconn)?;
        for lesson in owned {
            delete_published_lesson(dbconn, lesson.id)?;
        }

        diesel::delete(sections::table.filter(sections::id.eq(id)))
            .execute(dbconn)?;
    }

    // The merge is fully applied; drop the draft subtree.
    gc::purge_draft(dbconn, draft.id)?;
    diesel::delete(course_drafts::table
        .filter(course_drafts::id.eq(draft.id)))
        .execute(dbconn)?;

    Ok(())
}

/// Delete a published lesson and the content it references. A no-op if the
/// lesson is already gone.
fn delete_published_lesson(dbconn: &Connection, id: Uuid)
-> Result<(), DbError> {
    let lesson = lessons::table
        .filter(lessons::id.eq(id))
        .get_result::<db::Lesson>(dbconn)
        .optional()?;

    if let Some(lesson) = lesson {
        diesel::delete(lessons::table.filter(lessons::id.eq(lesson.id)))
            .execute(dbconn)?;
        diesel::delete(contents::table.filter(contents::id.eq(lesson.content)))
            .execute(dbconn)?;
    }

    Ok(())
}

#[derive(Debug, Fail)]
pub enum MergeError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// Concurrent mutation detected while applying the draft.
    #[fail(display = "Draft was mutated concurrently during merge")]
    Conflict,
    /// The draft subtree references rows that no longer exist.
    #[fail(display = "Draft subtree is inconsistent")]
    Inconsistent,
}

impl_from! { for MergeError ;
    DbError => |e| match e {
        DbError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) =>
            MergeError::Conflict,
        e => MergeError::Database(e),
    },
}
