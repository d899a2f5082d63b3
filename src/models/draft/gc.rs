//! Cascade sweep of dependent draft rows.
//!
//! Deleting a draft node must take its dependents with it in the same
//! logical operation: a lesson draft owns a content draft, a section draft
//! owns lesson drafts, and a course draft owns the whole subtree. The sweep
//! is an explicit, synchronous step of every delete path rather than a
//! storage-level hook, so it is visible in the call graph and testable on
//! its own.
//!
//! A missing dependent is logged and recovered, never fatal: user-initiated
//! deletes always complete.

use diesel::{
    prelude::*,
    result::Error as DbError,
};

use crate::db::{
    Connection,
    models as db,
    schema::{content_drafts, draft_changes, lesson_drafts, section_drafts},
    types::EntityKind,
};
use super::change;

/// Remove the dependents of a lesson draft that is going away: its owned
/// content draft and the recorded changes of both rows.
pub(crate) fn collect_lesson(dbconn: &Connection, lesson: &db::LessonDraft)
-> Result<(), DbError> {
    let removed = diesel::delete(content_drafts::table
        .filter(content_drafts::id.eq(lesson.content)))
        .execute(dbconn)?;

    if removed == 0 {
        warn!(
            "lesson draft {} references missing content draft {}",
            lesson.id, lesson.content,
        );
    }

    change::clear(dbconn, lesson.draft, EntityKind::Content, lesson.content)?;
    change::clear(dbconn, lesson.draft, EntityKind::Lesson, lesson.id)
}

/// Remove the dependents of a section draft that is going away: all owned
/// lesson drafts (and, transitively, their content drafts) and the recorded
/// changes of the section itself.
///
/// Published lessons under a published-backed section are not touched here;
/// the merge cascades over them when it applies the section's deletion.
pub(crate) fn collect_section(dbconn: &Connection, section: &db::SectionDraft)
-> Result<(), DbError> {
    let lessons = lesson_drafts::table
        .filter(lesson_drafts::section_draft.eq(section.id))
        .get_results::<db::LessonDraft>(dbconn)?;

    for lesson in lessons {
        collect_lesson(dbconn, &lesson)?;
        diesel::delete(&lesson).execute(dbconn)?;
    }

    change::clear(dbconn, section.draft, EntityKind::Section, section.id)
}

/// Remove the entire subtree of a course draft, children first. The course
/// draft row itself is left to the caller.
pub(crate) fn purge_draft(dbconn: &Connection, draft: i32)
-> Result<(), DbError> {
    diesel::delete(draft_changes::table
        .filter(draft_changes::draft.eq(draft)))
        .execute(dbconn)?;
    diesel::delete(lesson_drafts::table
        .filter(lesson_drafts::draft.eq(draft)))
        .execute(dbconn)?;
    diesel::delete(content_drafts::table
        .filter(content_drafts::draft.eq(draft)))
        .execute(dbconn)?;
    diesel::delete(section_drafts::table
        .filter(section_drafts::draft.eq(draft)))
        .execute(dbconn)?;

    Ok(())
}
