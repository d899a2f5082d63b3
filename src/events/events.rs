use failure::Fail;
use uuid::Uuid;

/// A domain event recorded by the draft lifecycle.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Event {
    Created(DraftCreated),
    Submitted(DraftSubmitted),
    Approved(DraftApproved),
    Rejected(DraftRejected),
    Canceled(DraftCanceled),
    Reopened(DraftReopened),
}

/// A draft was materialized for a course.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DraftCreated {
    /// Course for which a draft was created.
    pub course: Uuid,
}

/// A draft was submitted for moderation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DraftSubmitted {
    /// Course whose draft was submitted.
    pub course: Uuid,
}

/// A pending draft was approved and merged.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DraftApproved {
    /// Course whose draft was approved.
    pub course: Uuid,
}

/// A pending draft was rejected.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DraftRejected {
    /// Course whose draft was rejected.
    pub course: Uuid,
    /// Reason given by the moderator, if any.
    pub reason: Option<String>,
}

/// A draft was discarded by its author.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DraftCanceled {
    /// Course whose draft was discarded.
    pub course: Uuid,
}

/// A rejected draft was reopened for editing.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DraftReopened {
    /// Course whose draft was reopened.
    pub course: Uuid,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match *self {
            Event::Created(_) => "created",
            Event::Submitted(_) => "submitted",
            Event::Approved(_) => "approved",
            Event::Rejected(_) => "rejected",
            Event::Canceled(_) => "canceled",
            Event::Reopened(_) => "reopened",
        }
    }

    pub fn course(&self) -> Uuid {
        match *self {
            Event::Created(DraftCreated { course })
            | Event::Submitted(DraftSubmitted { course })
            | Event::Approved(DraftApproved { course })
            | Event::Rejected(DraftRejected { course, .. })
            | Event::Canceled(DraftCanceled { course })
            | Event::Reopened(DraftReopened { course }) => course,
        }
    }

    /// Decode an event loaded from the database.
    ///
    /// The stored payloads of different kinds are structurally similar, so
    /// decoding dispatches on the recorded kind rather than guessing.
    pub fn load(kind: &str, data: &[u8]) -> Result<Event, LoadEventError> {
        Ok(match kind {
            "created" => Event::Created(rmps::from_slice(data)?),
            "submitted" => Event::Submitted(rmps::from_slice(data)?),
            "approved" => Event::Approved(rmps::from_slice(data)?),
            "rejected" => Event::Rejected(rmps::from_slice(data)?),
            "canceled" => Event::Canceled(rmps::from_slice(data)?),
            "reopened" => Event::Reopened(rmps::from_slice(data)?),
            _ => return Err(LoadEventError::UnknownKind(kind.to_string())),
        })
    }
}

impl_from! { for Event ;
    DraftCreated => |e| Event::Created(e),
    DraftSubmitted => |e| Event::Submitted(e),
    DraftApproved => |e| Event::Approved(e),
    DraftRejected => |e| Event::Rejected(e),
    DraftCanceled => |e| Event::Canceled(e),
    DraftReopened => |e| Event::Reopened(e),
}

#[derive(Debug, Fail)]
pub enum LoadEventError {
    /// The stored payload could not be decoded.
    #[fail(display = "Malformed event payload: {}", _0)]
    Malformed(#[cause] rmps::decode::Error),
    /// The stored kind is not known to this version.
    #[fail(display = "Unknown event kind {:?}", _0)]
    UnknownKind(String),
}

impl_from! { for LoadEventError ;
    rmps::decode::Error => |e| LoadEventError::Malformed(e),
}
