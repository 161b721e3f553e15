use tracing::{debug, warn};

use crate::models::{number, text, DEFAULT_ARTWORK_PATH};
use crate::{NowPlaying, PlaylistEntry, ServerSettings, StatusSnapshot, StatusUpdate};

/// Build the now-playing record from `result.playlist_loop[0]` and
/// `result.time`.
///
/// Returns `None` when either is missing, which the display treats as
/// "nothing reported". Fields missing inside the track entry fall back to
/// empty strings, zero and the default artwork.
pub fn project_now_playing(
    snapshot: &StatusSnapshot,
    settings: &ServerSettings,
) -> Option<NowPlaying> {
    let Some(track) = snapshot.playlist_loop().and_then(|tracks| tracks.first()) else {
        warn!("Status has no result.playlist_loop[0], nothing is playing");
        return None;
    };
    let Some(elapsed) = snapshot.elapsed() else {
        warn!("Status has no result.time, cannot build now playing");
        return None;
    };

    let artwork_url = match track.get("artwork_url").and_then(|v| v.as_str()) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => url.to_string(),
        Some(url) if !url.is_empty() => {
            let separator = if url.starts_with('/') { "" } else { "/" };
            format!("{}{}{}", settings.base_url(), separator, url)
        }
        _ => DEFAULT_ARTWORK_PATH.to_string(),
    };

    let now_playing = NowPlaying {
        title: text(track, "title"),
        artist: text(track, "artist"),
        album: text(track, "album"),
        duration: track.get("duration").and_then(number).unwrap_or(0.0),
        elapsed,
        artwork_url,
    };
    debug!(title = %now_playing.title, "Processed now playing data");
    Some(now_playing)
}

/// Map every `result.playlist_loop` entry. Missing data is an empty playlist,
/// never an error.
pub fn project_playlist(snapshot: &StatusSnapshot) -> Vec<PlaylistEntry> {
    let Some(tracks) = snapshot.playlist_loop() else {
        debug!("Status has no result.playlist_loop, playlist is empty");
        return Vec::new();
    };

    let playlist: Vec<PlaylistEntry> = tracks
        .iter()
        .map(|track| PlaylistEntry {
            title: text(track, "title"),
            artist: text(track, "artist"),
            album: text(track, "album"),
            duration: track.get("duration").and_then(number).unwrap_or(0.0),
        })
        .collect();
    debug!(entries = playlist.len(), "Processed playlist data");
    playlist
}

/// Both projections of one snapshot.
pub fn project(snapshot: &StatusSnapshot, settings: &ServerSettings) -> StatusUpdate {
    StatusUpdate {
        now_playing: project_now_playing(snapshot, settings),
        playlist: project_playlist(snapshot),
    }
}
