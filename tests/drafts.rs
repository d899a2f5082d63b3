//! Tests for the draft store: materialization, change tracking, and the
//! cascade sweep.

use diesel::prelude::*;
use failure::Error;
use lazy_static::lazy_static;
use lectern::{
    db::{
        models as db,
        schema::{
            content_drafts,
            contents,
            course_drafts,
            draft_changes,
            lesson_drafts,
            section_drafts,
            sections,
        },
        types::{ChangeKind, ContentKind, EntityKind},
    },
    events::Actor,
    models::{
        content::Data,
        draft::{
            CourseDraft,
            CreateDraftError,
            EditDraftError,
            LessonDraft,
            SectionDraft,
            Value,
            section::EditSectionError,
        },
    },
};
use serde_json::json;
use uuid::Uuid;

mod common;

use self::common::{Connection, Database, run, setup_db};

lazy_static! {
    static ref DB: Database =
        setup_db(seed).expect("cannot create test database");

    static ref C1: Uuid = Uuid::from_bytes([0x11; 16]);
    static ref C2: Uuid = Uuid::from_bytes([0x22; 16]);

    static ref S1: Uuid = Uuid::from_bytes([0xa1; 16]);
    static ref S2: Uuid = Uuid::from_bytes([0xa2; 16]);

    static ref L1: Uuid = Uuid::from_bytes([0xb1; 16]);
    static ref L2: Uuid = Uuid::from_bytes([0xb2; 16]);
    static ref L3: Uuid = Uuid::from_bytes([0xb3; 16]);
}

const AUTHOR: Actor = Actor::User(1);

fn seed(dbcon: &Connection) -> Result<(), Error> {
    use lectern::db::schema::{courses, lessons};

    diesel::insert_into(courses::table)
        .values([
            db::NewCourse {
                id: *C1,
                title: "Rust for Beginners",
                description: "A first course in Rust.",
            },
            db::NewCourse {
                id: *C2,
                title: "Advanced Async",
                description: "Futures, executors, and pinning.",
            },
        ].as_ref())
        .execute(dbcon)?;

    diesel::insert_into(sections::table)
        .values([
            db::NewSection {
                id: *S1,
                course: *C1,
                title: "Getting Started",
                index: 0,
            },
            db::NewSection {
                id: *S2,
                course: *C1,
                title: "Ownership",
                index: 1,
            },
        ].as_ref())
        .execute(dbcon)?;

    let video = diesel::insert_into(contents::table)
        .values(&db::NewContent {
            kind: ContentKind::Video,
            url: Some("https://cdn.lectern.test/install.mp4".to_string()),
            mime: None,
            duration: Some(420),
            data: None,
        })
        .get_result::<db::Content>(dbcon)?;

    let material = diesel::insert_into(contents::table)
        .values(&db::NewContent {
            kind: ContentKind::Material,
            url: Some("https://cdn.lectern.test/hello.pdf".to_string()),
            mime: Some("application/pdf".to_string()),
            duration: None,
            data: None,
        })
        .get_result::<db::Content>(dbcon)?;

    let quiz = diesel::insert_into(contents::table)
        .values(&db::NewContent {
            kind: ContentKind::Quiz,
            url: None,
            mime: None,
            duration: None,
            data: Some(json!({
                "questions": [
                    { "prompt": "Who owns a moved value?", "answers": 4 },
                ],
            })),
        })
        .get_result::<db::Content>(dbcon)?;

    diesel::insert_into(lessons::table)
        .values([
            db::NewLesson {
                id: *L1,
                section: *S1,
                title: "Installing the toolchain",
                index: 0,
                free_preview: true,
                kind: ContentKind::Video,
                content: video.id,
            },
            db::NewLesson {
                id: *L2,
                section: *S1,
                title: "Hello, world",
                index: 1,
                free_preview: false,
                kind: ContentKind::Material,
                content: material.id,
            },
            db::NewLesson {
                id: *L3,
                section: *S2,
                title: "Moves and borrows",
                index: 0,
                free_preview: false,
                kind: ContentKind::Quiz,
                content: quiz.id,
            },
        ].as_ref())
        .execute(dbcon)?;

    Ok(())
}

fn draft_counts(dbcon: &Connection) -> Result<(i64, i64, i64, i64), Error> {
    Ok((
        section_drafts::table.count().get_result(dbcon)?,
        lesson_drafts::table.count().get_result(dbcon)?,
        content_drafts::table.count().get_result(dbcon)?,
        draft_changes::table.count().get_result(dbcon)?,
    ))
}

#[test]
fn get_or_create_is_idempotent() {
    run(&DB, |dbcon| {
        let first = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let second = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;

        assert_eq!(first.id(), second.id());

        let drafts: i64 = course_drafts::table.count().get_result(dbcon)?;
        assert_eq!(drafts, 1);

        // The shell is empty: nothing was materialized eagerly.
        assert_eq!(draft_counts(dbcon)?, (0, 0, 0, 0));

        Ok(())
    })
}

#[test]
fn get_or_create_requires_a_published_course() {
    run(&DB, |dbcon| {
        let unknown = Uuid::from_bytes([0xff; 16]);

        match CourseDraft::get_or_create(dbcon, unknown, AUTHOR) {
            Err(CreateDraftError::CourseNotFound) => Ok(()),
            r => panic!("expected CourseNotFound, got {:?}", r),
        }
    })
}

#[test]
fn new_section_is_classified_new() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let section =
            SectionDraft::create(dbcon, &draft, AUTHOR, "Closures", 2)?;

        assert_eq!(section.change(), ChangeKind::New);

        let log = draft.change_log(dbcon)?;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].entity, EntityKind::Section);
        assert_eq!(log[0].entity_id, section.id());
        assert_eq!(log[0].change, ChangeKind::New);
        assert!(!log[0].fields.is_empty());
        assert!(log[0].fields.iter().all(|f| f.old.is_none()));

        Ok(())
    })
}

#[test]
fn materialized_section_is_unchanged() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let section =
            SectionDraft::for_published(dbcon, &draft, AUTHOR, *S1)?;
        let again =
            SectionDraft::for_published(dbcon, &draft, AUTHOR, *S1)?;

        assert_eq!(section.id(), again.id());
        assert_eq!(section.change(), ChangeKind::Unchanged);
        assert!(draft.change_log(dbcon)?.is_empty());
        assert!(!draft.has_changes(dbcon)?);

        Ok(())
    })
}

#[test]
fn renaming_published_section_marks_modified() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let mut section =
            SectionDraft::for_published(dbcon, &draft, AUTHOR, *S1)?;

        section.set_title(dbcon, AUTHOR, "Starting Out")?;

        assert_eq!(section.change(), ChangeKind::Modified);

        let log = draft.change_log(dbcon)?;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].fields.len(), 1);
        assert_eq!(log[0].fields[0].field, "title");
        assert_eq!(
            log[0].fields[0].old,
            Some(Value::String("Getting Started".to_string())),
        );
        assert_eq!(
            log[0].fields[0].new,
            Some(Value::String("Starting Out".to_string())),
        );

        // The published row is untouched until the draft is approved.
        let published = sections::table
            .filter(sections::id.eq(*S1))
            .get_result::<db::Section>(dbcon)?;
        assert_eq!(published.title, "Getting Started");

        Ok(())
    })
}

#[test]
fn reverting_an_edit_reclassifies_as_unchanged() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let mut section =
            SectionDraft::for_published(dbcon, &draft, AUTHOR, *S1)?;

        section.set_title(dbcon, AUTHOR, "Starting Out")?;
        assert_eq!(section.change(), ChangeKind::Modified);

        section.set_title(dbcon, AUTHOR, "Getting Started")?;
        assert_eq!(section.change(), ChangeKind::Unchanged);

        // No stale records may survive the revert.
        assert!(draft.change_log(dbcon)?.is_empty());
        assert!(!draft.has_changes(dbcon)?);

        Ok(())
    })
}

#[test]
fn new_lesson_tracks_its_content() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let section =
            SectionDraft::for_published(dbcon, &draft, AUTHOR, *S1)?;

        let lesson = LessonDraft::create(
            dbcon,
            &section,
            AUTHOR,
            "Cargo basics",
            2,
            false,
            Data::Video {
                url: "https://cdn.lectern.test/cargo.mp4".to_string(),
                duration: 300,
            },
        )?;

        assert_eq!(lesson.change(), ChangeKind::New);

        let payload = lesson.content(dbcon)?;
        assert_eq!(payload.change(), ChangeKind::New);
        assert_eq!(payload.data()?, Data::Video {
            url: "https://cdn.lectern.test/cargo.mp4".to_string(),
            duration: 300,
        });

        let log = draft.change_log(dbcon)?;
        let entities = log.iter()
            .map(|entry| entry.entity)
            .collect::<Vec<_>>();
        assert_eq!(entities, [EntityKind::Lesson, EntityKind::Content]);

        Ok(())
    })
}

#[test]
fn materializing_a_lesson_creates_its_parent_section_draft() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let lesson = LessonDraft::for_published(dbcon, &draft, AUTHOR, *L1)?;

        assert_eq!(lesson.change(), ChangeKind::Unchanged);

        // The parent section draft exists even though the section itself is
        // untouched, and the published content was copied into an owned
        // content draft.
        let (sections, lessons, payloads, records) = draft_counts(dbcon)?;
        assert_eq!((sections, lessons, payloads, records), (1, 1, 1, 0));

        let payload = lesson.content(dbcon)?;
        assert_eq!(payload.change(), ChangeKind::Unchanged);
        assert!(!draft.has_changes(dbcon)?);

        Ok(())
    })
}

#[test]
fn editing_materialized_content_marks_it_modified() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let mut lesson =
            LessonDraft::for_published(dbcon, &draft, AUTHOR, *L1)?;

        lesson.set_content(dbcon, AUTHOR, Data::Video {
            url: "https://cdn.lectern.test/install.mp4".to_string(),
            duration: 480,
        })?;

        // The lesson's own fields are untouched; only the payload changed.
        assert_eq!(lesson.change(), ChangeKind::Unchanged);

        let payload = lesson.content(dbcon)?;
        assert_eq!(payload.change(), ChangeKind::Modified);

        let log = draft.change_log(dbcon)?;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].entity, EntityKind::Content);
        assert_eq!(log[0].fields.len(), 1);
        assert_eq!(log[0].fields[0].field, "duration");
        assert_eq!(log[0].fields[0].old, Some(Value::Number(420)));
        assert_eq!(log[0].fields[0].new, Some(Value::Number(480)));

        Ok(())
    })
}

#[test]
fn moving_a_lesson_records_a_reference_change() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let mut lesson =
            LessonDraft::for_published(dbcon, &draft, AUTHOR, *L3)?;
        let target =
            SectionDraft::for_published(dbcon, &draft, AUTHOR, *S1)?;

        lesson.set_section(dbcon, AUTHOR, &target)?;

        assert_eq!(lesson.change(), ChangeKind::Modified);

        let log = draft.change_log(dbcon)?;
        let entry = log.iter()
            .find(|entry| entry.entity == EntityKind::Lesson)
            .expect("no lesson entry in change log");
        assert_eq!(entry.fields.len(), 1);
        assert_eq!(entry.fields[0].field, "section");
        assert_eq!(entry.fields[0].old, Some(Value::Reference(*S2)));
        assert_eq!(entry.fields[0].new, Some(Value::Reference(*S1)));

        Ok(())
    })
}

#[test]
fn deleting_new_section_removes_the_whole_branch() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let section =
            SectionDraft::create(dbcon, &draft, AUTHOR, "Closures", 2)?;
        LessonDraft::create(
            dbcon,
            &section,
            AUTHOR,
            "Fn traits",
            0,
            false,
            Data::Video {
                url: "https://cdn.lectern.test/fn.mp4".to_string(),
                duration: 240,
            },
        )?;

        section.delete(dbcon, AUTHOR)?;

        assert_eq!(draft_counts(dbcon)?, (0, 0, 0, 0));

        Ok(())
    })
}

#[test]
fn deleting_published_lesson_flags_it_for_removal() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let lesson = LessonDraft::for_published(dbcon, &draft, AUTHOR, *L2)?;
        let id = lesson.id();

        lesson.delete(dbcon, AUTHOR)?;

        let row = lesson_drafts::table
            .filter(lesson_drafts::id.eq(id))
            .get_result::<db::LessonDraft>(dbcon)?;
        assert_eq!(row.change, ChangeKind::Deleted);

        let payload = content_drafts::table
            .filter(content_drafts::id.eq(row.content))
            .get_result::<db::ContentDraft>(dbcon)?;
        assert_eq!(payload.change, ChangeKind::Deleted);

        // The deletion alone counts as a net change.
        assert!(draft.has_changes(dbcon)?);

        Ok(())
    })
}

#[test]
fn deleting_a_lesson_with_missing_content_draft_succeeds() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let lesson = LessonDraft::for_published(dbcon, &draft, AUTHOR, *L1)?;
        let id = lesson.id();

        // Simulate a lost dependent.
        diesel::delete(content_drafts::table)
            .execute(dbcon)?;

        lesson.delete(dbcon, AUTHOR)?;

        let row = lesson_drafts::table
            .filter(lesson_drafts::id.eq(id))
            .get_result::<db::LessonDraft>(dbcon)?;
        assert_eq!(row.change, ChangeKind::Deleted);

        Ok(())
    })
}

#[test]
fn deleting_a_new_lesson_with_missing_content_draft_succeeds() {
    run(&DB, |dbcon| {
        let draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        let section =
            SectionDraft::create(dbcon, &draft, AUTHOR, "Closures", 2)?;
        let lesson = LessonDraft::create(
            dbcon,
            &section,
            AUTHOR,
            "Fn traits",
            0,
            false,
            Data::Quiz { data: json!({ "questions": [] }) },
        )?;

        diesel::delete(content_drafts::table).execute(dbcon)?;

        lesson.delete(dbcon, AUTHOR)?;

        let lessons: i64 = lesson_drafts::table.count().get_result(dbcon)?;
        assert_eq!(lessons, 0);

        Ok(())
    })
}

#[test]
fn editing_while_pending_is_rejected() {
    run(&DB, |dbcon| {
        let mut draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;
        SectionDraft::create(dbcon, &draft, AUTHOR, "Closures", 2)?;
        CourseDraft::submit(dbcon, *C1, AUTHOR)?;

        match SectionDraft::create(dbcon, &draft, AUTHOR, "Macros", 3) {
            Err(EditSectionError::Draft(EditDraftError::Pending)) => {}
            r => panic!("expected Pending, got {:?}", r),
        }

        match draft.set_title(dbcon, AUTHOR, "Rust from Scratch") {
            Err(EditDraftError::Pending) => {}
            r => panic!("expected Pending, got {:?}", r),
        }

        // The refused edits left nothing behind.
        let (sections, ..) = draft_counts(dbcon)?;
        assert_eq!(sections, 1);

        Ok(())
    })
}

#[test]
fn change_log_lists_entities_in_draft_order() {
    run(&DB, |dbcon| {
        let mut draft = CourseDraft::get_or_create(dbcon, *C1, AUTHOR)?;

        let mut lesson =
            LessonDraft::for_published(dbcon, &draft, AUTHOR, *L1)?;
        lesson.set_title(dbcon, AUTHOR, "Installing Rust")?;

        let mut section =
            SectionDraft::for_published(dbcon, &draft, AUTHOR, *S2)?;
        section.set_title(dbcon, AUTHOR, "Ownership and Borrowing")?;

        draft.set_title(dbcon, AUTHOR, "Rust from Scratch")?;

        let log = draft.change_log(dbcon)?;
        let entities = log.iter()
            .map(|entry| (entry.entity, entry.change))
            .collect::<Vec<_>>();

        // Course first, then sections in course order, then lessons;
        // unchanged entities (such as L1's parent section draft) do not
        // appear.
        assert_eq!(entities, [
            (EntityKind::Course, ChangeKind::Modified),
            (EntityKind::Section, ChangeKind::Modified),
            (EntityKind::Lesson, ChangeKind::Modified),
        ]);

        Ok(())
    })
}
