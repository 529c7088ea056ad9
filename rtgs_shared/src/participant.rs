//! Participant (avatar) state shared by server and client.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Kind of participant. Unrecognized wire tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParticipantKind {
    Player,
    Bot,
    Admin,
    Unknown(String),
}

impl ParticipantKind {
    pub fn as_str(&self) -> &str {
        match self {
            ParticipantKind::Player => "player",
            ParticipantKind::Bot => "bot",
            ParticipantKind::Admin => "admin",
            ParticipantKind::Unknown(tag) => tag,
        }
    }
}

impl From<&str> for ParticipantKind {
    fn from(tag: &str) -> Self {
        match tag {
            "player" => ParticipantKind::Player,
            "bot" => ParticipantKind::Bot,
            "admin" => ParticipantKind::Admin,
            other => ParticipantKind::Unknown(other.to_string()),
        }
    }
}

impl From<String> for ParticipantKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "player" | "bot" | "admin" => ParticipantKind::from(tag.as_str()),
            _ => ParticipantKind::Unknown(tag),
        }
    }
}

impl From<ParticipantKind> for String {
    fn from(kind: ParticipantKind) -> Self {
        match kind {
            ParticipantKind::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronized avatar state.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub kind: ParticipantKind,
    pub location: Vec3,
    /// Heading in degrees, `[0, 360)` for spawned participants.
    pub orientation: f32,
    pub active: bool,
}
