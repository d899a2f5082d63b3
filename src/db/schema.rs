table! {
    contents (id) {
        id -> Int4,
        kind -> crate::db::types::Content_kind,
        url -> Nullable<Varchar>,
        mime -> Nullable<Varchar>,
        duration -> Nullable<Int4>,
        data -> Nullable<Jsonb>,
    }
}

table! {
    content_drafts (id) {
        id -> Int4,
        draft -> Int4,
        kind -> crate::db::types::Content_kind,
        url -> Nullable<Varchar>,
        mime -> Nullable<Varchar>,
        duration -> Nullable<Int4>,
        data -> Nullable<Jsonb>,
        content -> Nullable<Int4>,
        change -> crate::db::types::Change_kind,
    }
}

table! {
    courses (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Text,
    }
}

table! {
    course_drafts (id) {
        id -> Int4,
        course -> Uuid,
        status -> crate::db::types::Draft_status,
        title -> Varchar,
        description -> Text,
        created -> Timestamp,
        updated -> Timestamp,
    }
}

table! {
    draft_changes (id) {
        id -> Int4,
        draft -> Int4,
        entity -> crate::db::types::Entity_kind,
        entity_id -> Int4,
        field -> Varchar,
        old -> Nullable<Jsonb>,
        new -> Nullable<Jsonb>,
    }
}

table! {
    draft_events (id) {
        id -> Int4,
        course -> Uuid,
        kind -> Varchar,
        actor -> Nullable<Int4>,
        timestamp -> Timestamp,
        data -> Bytea,
    }
}

table! {
    lessons (id) {
        id -> Uuid,
        section -> Uuid,
        title -> Varchar,
        index -> Int4,
        free_preview -> Bool,
        kind -> crate::db::types::Content_kind,
        content -> Int4,
    }
}

table! {
    lesson_drafts (id) {
        id -> Int4,
        draft -> Int4,
        section_draft -> Int4,
        lesson -> Nullable<Uuid>,
        title -> Varchar,
        index -> Int4,
        free_preview -> Bool,
        kind -> crate::db::types::Content_kind,
        content -> Int4,
        change -> crate::db::types::Change_kind,
    }
}

table! {
    sections (id) {
        id -> Uuid,
        course -> Uuid,
        title -> Varchar,
        index -> Int4,
    }
}

table! {
    section_drafts (id) {
        id -> Int4,
        draft -> Int4,
        section -> Nullable<Uuid>,
        title -> Varchar,
        index -> Int4,
        change -> crate::db::types::Change_kind,
    }
}

joinable!(content_drafts -> course_drafts (draft));
joinable!(course_drafts -> courses (course));
joinable!(draft_changes -> course_drafts (draft));
joinable!(lessons -> contents (content));
joinable!(lessons -> sections (section));
joinable!(lesson_drafts -> content_drafts (content));
joinable!(lesson_drafts -> course_drafts (draft));
joinable!(lesson_drafts -> section_drafts (section_draft));
joinable!(sections -> courses (course));
joinable!(section_drafts -> course_drafts (draft));

allow_tables_to_appear_in_same_query!(
    contents,
    content_drafts,
    courses,
    course_drafts,
    draft_changes,
    draft_events,
    lessons,
    lesson_drafts,
    sections,
    section_drafts,
);
