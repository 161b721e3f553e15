use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Artwork shown when the server reports none.
pub const DEFAULT_ARTWORK_PATH: &str =
    "special://home/addons/plugin.program.klmsaddon/resources/media/demo-cover.jpg";

/// Raw `status` response as returned by `jsonrpc.js`. Never mutated; each
/// refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot(Value);

impl StatusSnapshot {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn result(&self) -> Option<&Value> {
        self.0.get("result")
    }

    pub fn playlist_loop(&self) -> Option<&Vec<Value>> {
        self.result()?.get("playlist_loop")?.as_array()
    }

    /// Elapsed seconds of the current track (`result.time`).
    pub fn elapsed(&self) -> Option<f64> {
        number(self.result()?.get("time")?)
    }
}

impl From<Value> for StatusSnapshot {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Display-ready description of the current track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Track length in seconds
    pub duration: f64,
    /// Playback position in seconds
    pub elapsed: f64,
    pub artwork_url: String,
}

impl NowPlaying {
    /// What the display shows when nothing is reported: empty labels and the
    /// default cover.
    pub fn placeholder() -> Self {
        Self {
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            duration: 0.0,
            elapsed: 0.0,
            artwork_url: DEFAULT_ARTWORK_PATH.to_string(),
        }
    }

    /// Progress through the track (0-100).
    pub fn progress_percentage(&self) -> f64 {
        if self.duration > 0.0 {
            (self.elapsed / self.duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

impl fmt::Display for NowPlaying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Now Playing: {} by {} from the album {} [{}/{} seconds]",
            self.title, self.artist, self.album, self.elapsed, self.duration
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: f64,
}

/// One projected refresh, as delivered to update subscribers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusUpdate {
    pub now_playing: Option<NowPlaying>,
    pub playlist: Vec<PlaylistEntry>,
}

impl StatusUpdate {
    /// The "nothing reported" update: display falls back to defaults.
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_cleared(&self) -> bool {
        self.now_playing.is_none() && self.playlist.is_empty()
    }
}

// LMS sends durations as numbers, but some plugins report them as strings
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn text(entry: &Value, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
