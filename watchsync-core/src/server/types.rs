//! Types for session server requests and responses

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque session identifier issued by the server at join time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawSessionId")]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Servers hand out ids either as strings or as bare numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSessionId {
    Text(String),
    Integer(u64),
}

impl From<RawSessionId> for SessionId {
    fn from(raw: RawSessionId) -> Self {
        match raw {
            RawSessionId::Text(s) => Self(s),
            RawSessionId::Integer(n) => Self(n.to_string()),
        }
    }
}

/// Response for the join endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct JoinResponse {
    pub id: SessionId,
}

/// One participant as shown in the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub username: String,
    pub status: String,
}

/// Playback status as the server reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
}

/// Raw playback section of the check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackResponse {
    pub status: PlaybackStatus,

    /// Timeline position in seconds
    pub video_time: f64,

    /// Absolute resume instant in milliseconds since the UNIX epoch
    #[serde(default)]
    pub play_time: Option<f64>,
}

/// Response for the check endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub clients: Vec<RosterEntry>,
    pub playback: PlaybackResponse,
}

/// Authoritative playback state, valid for one reconciliation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackSnapshot {
    /// Everyone should be at `video_time` at `play_deadline_ms` and playing
    Playing { video_time: f64, play_deadline_ms: f64 },
    /// The shared timeline is paused at `video_time`
    Paused { video_time: f64 },
}

impl TryFrom<PlaybackResponse> for PlaybackSnapshot {
    type Error = String;

    fn try_from(raw: PlaybackResponse) -> Result<Self, Self::Error> {
        if !raw.video_time.is_finite() {
            return Err(format!("videoTime is not a finite number ({})", raw.video_time));
        }

        match raw.status {
            PlaybackStatus::Paused => Ok(PlaybackSnapshot::Paused {
                video_time: raw.video_time,
            }),
            PlaybackStatus::Playing => match raw.play_time {
                Some(deadline) if deadline.is_finite() => Ok(PlaybackSnapshot::Playing {
                    video_time: raw.video_time,
                    play_deadline_ms: deadline,
                }),
                Some(deadline) => Err(format!("playTime is not a finite number ({})", deadline)),
                None => Err("status is playing but playTime is missing".to_string()),
            },
        }
    }
}

/// Decoded check response: roster plus playback snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct CheckSnapshot {
    pub clients: Vec<RosterEntry>,
    pub playback: PlaybackSnapshot,
}

impl TryFrom<CheckResponse> for CheckSnapshot {
    type Error = String;

    fn try_from(raw: CheckResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            clients: raw.clients,
            playback: PlaybackSnapshot::try_from(raw.playback)?,
        })
    }
}
