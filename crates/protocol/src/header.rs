use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PROTOCOL_VERSION;

/// Wire format of the `date` header field.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// The header of a wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Unique per message
    pub msg_id: String,

    pub username: String,

    /// Unique per session
    pub session: String,

    /// Creation time, `yyyy-MM-ddTHH:mm:ssZ`
    pub date: String,

    /// Canonical content type, e.g. `execute_request`
    pub msg_type: String,

    /// Messaging protocol version
    pub version: String,
}

impl Header {
    pub fn new(msg_type: &str, session: &str, username: &str) -> Self {
        Self::at(msg_type, session, username, Utc::now())
    }

    pub fn at(msg_type: &str, session: &str, username: &str, date: DateTime<Utc>) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            session: session.to_string(),
            date: date.format(DATE_FORMAT).to_string(),
            msg_type: msg_type.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}
