//! Domain events of the draft lifecycle.
//!
//! Every lifecycle transition records an event row keyed by the course (not
//! the draft, so the record survives the draft's purge). Persisting the row
//! is the emission: external notifiers tail the event table on their own
//! schedule, and nothing in this crate depends on their delivery.

use diesel::{
    prelude::*,
    result::Error as DbError,
};
use failure::Fail;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::draft_events,
};

mod events;

pub use self::events::*;

/// Entity responsible for an action.
#[derive(Clone, Copy, Debug)]
pub enum Actor {
    /// The system itself; used for actions carried out automatically or
    /// invoked from administrative tooling.
    System,
    /// A user.
    User(i32),
}

impl Actor {
    fn as_db(&self) -> Option<i32> {
        match *self {
            Actor::System => None,
            Actor::User(id) => Some(id),
        }
    }
}

impl From<i32> for Actor {
    fn from(id: i32) -> Self {
        Actor::User(id)
    }
}

/// Record a domain event.
///
/// Takes an explicit database connection so it can safely be used inside an
/// existing transaction, only adding the event when the transaction is
/// committed.
pub fn store(dbconn: &Connection, actor: Actor, event: &Event)
-> Result<(), DbError> {
    let data = rmps::to_vec_named(event).expect("invalid event data");

    diesel::insert_into(draft_events::table)
        .values(&db::NewDraftEvent {
            course: event.course(),
            kind: event.kind(),
            actor: actor.as_db(),
            data: &data,
        })
        .execute(dbconn)?;

    Ok(())
}

/// Load all events recorded for a course, oldest first.
pub fn for_course(dbconn: &Connection, course: Uuid)
-> Result<Vec<(db::DraftEvent, Event)>, LoadEventsError> {
    draft_events::table
        .filter(draft_events::course.eq(course))
        .order_by(draft_events::id.asc())
        .get_results::<db::DraftEvent>(dbconn)?
        .into_iter()
        .map(|row| {
            let event = Event::load(&row.kind, &row.data)?;
            Ok((row, event))
        })
        .collect()
}

/// Load just the kinds of the events recorded for a course, oldest first.
pub(crate) fn kinds_for_course(dbconn: &Connection, course: Uuid)
-> Result<Vec<String>, DbError> {
    draft_events::table
        .filter(draft_events::course.eq(course))
        .order_by(draft_events::id.asc())
        .select(draft_events::kind)
        .get_results::<String>(dbconn)
}

#[derive(Debug, Fail)]
pub enum LoadEventsError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// A stored event could not be decoded.
    #[fail(display = "{}", _0)]
    Event(#[cause] LoadEventError),
}

impl_from! { for LoadEventsError ;
    DbError => |e| LoadEventsError::Database(e),
    LoadEventError => |e| LoadEventsError::Event(e),
}
