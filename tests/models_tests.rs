use serde_json::json;

use lms_now_playing::{
    project, project_now_playing, project_playlist, status_request_body, NowPlaying,
    PlaylistEntry, ServerSettings, StatusSnapshot, DEFAULT_ARTWORK_PATH,
};

fn example_settings() -> ServerSettings {
    ServerSettings::new("10.0.0.5", 9000, 9090, "aa:bb:cc:dd:ee:ff")
}

fn example_snapshot() -> StatusSnapshot {
    StatusSnapshot::new(json!({
        "result": {
            "time": 12.5,
            "playlist_loop": [
                {
                    "title": "Track",
                    "artist": "Artist X",
                    "album": "Album Y",
                    "duration": 245,
                    "artwork_url": "/music/123/cover.jpg"
                },
                {
                    "title": "Next One",
                    "artist": "Artist Z",
                    "album": "Album Y",
                    "duration": 198.4
                }
            ]
        }
    }))
}

#[test]
fn test_project_now_playing_example() {
    let now_playing = project_now_playing(&example_snapshot(), &example_settings())
        .expect("snapshot has a current track");
    assert_eq!(
        now_playing,
        NowPlaying {
            title: "Track".to_string(),
            artist: "Artist X".to_string(),
            album: "Album Y".to_string(),
            duration: 245.0,
            elapsed: 12.5,
            artwork_url: "http://10.0.0.5:9000/music/123/cover.jpg".to_string(),
        }
    );
}

#[test]
fn test_project_playlist_example() {
    let playlist = project_playlist(&example_snapshot());
    assert_eq!(
        playlist,
        vec![
            PlaylistEntry {
                title: "Track".to_string(),
                artist: "Artist X".to_string(),
                album: "Album Y".to_string(),
                duration: 245.0,
            },
            PlaylistEntry {
                title: "Next One".to_string(),
                artist: "Artist Z".to_string(),
                album: "Album Y".to_string(),
                duration: 198.4,
            },
        ]
    );
}

// Missing playlist_loop: now playing is None, playlist is empty
#[test]
fn test_projection_fallback_without_playlist_loop() {
    let snapshot = StatusSnapshot::new(json!({ "result": { "time": 3, "mode": "stop" } }));
    assert_eq!(project_now_playing(&snapshot, &example_settings()), None);
    assert!(project_playlist(&snapshot).is_empty());

    let update = project(&snapshot, &example_settings());
    assert!(update.is_cleared());
}

#[test]
fn test_projection_fallback_on_odd_shapes() {
    let settings = example_settings();
    for value in [
        json!({}),
        json!({ "result": null }),
        json!({ "result": { "playlist_loop": [] , "time": 0 } }),
        json!({ "result": { "playlist_loop": "nope", "time": 0 } }),
        json!([1, 2, 3]),
    ] {
        let snapshot = StatusSnapshot::new(value);
        assert_eq!(project_now_playing(&snapshot, &settings), None);
        assert!(project_playlist(&snapshot).is_empty());
    }
}

#[test]
fn test_missing_time_means_nothing_reported() {
    let snapshot = StatusSnapshot::new(json!({
        "result": { "playlist_loop": [ { "title": "A" } ] }
    }));
    assert_eq!(project_now_playing(&snapshot, &example_settings()), None);
    // The playlist doesn't depend on time
    assert_eq!(project_playlist(&snapshot).len(), 1);
}

#[test]
fn test_missing_track_fields_use_defaults() {
    let snapshot = StatusSnapshot::new(json!({
        "result": { "time": "7.25", "playlist_loop": [ { "title": "Radio Stream" } ] }
    }));
    let now_playing = project_now_playing(&snapshot, &example_settings()).unwrap();
    assert_eq!(now_playing.title, "Radio Stream");
    assert_eq!(now_playing.artist, "");
    assert_eq!(now_playing.album, "");
    assert_eq!(now_playing.duration, 0.0);
    assert_eq!(now_playing.elapsed, 7.25);
    assert_eq!(now_playing.artwork_url, DEFAULT_ARTWORK_PATH);
}

#[test]
fn test_absolute_artwork_url_is_kept() {
    let snapshot = StatusSnapshot::new(json!({
        "result": {
            "time": 1,
            "playlist_loop": [ {
                "title": "T",
                "artwork_url": "https://cdn.example.com/cover.png",
                "duration": "180"
            } ]
        }
    }));
    let now_playing = project_now_playing(&snapshot, &example_settings()).unwrap();
    assert_eq!(now_playing.artwork_url, "https://cdn.example.com/cover.png");
    assert_eq!(now_playing.duration, 180.0);
}

#[test]
fn test_relative_artwork_without_slash() {
    let snapshot = StatusSnapshot::new(json!({
        "result": {
            "time": 1,
            "playlist_loop": [ { "artwork_url": "imageproxy/x/image.png" } ]
        }
    }));
    let now_playing = project_now_playing(&snapshot, &example_settings()).unwrap();
    assert_eq!(
        now_playing.artwork_url,
        "http://10.0.0.5:9000/imageproxy/x/image.png"
    );
}

#[test]
fn test_now_playing_display_and_placeholder() {
    let now_playing = project_now_playing(&example_snapshot(), &example_settings()).unwrap();
    assert_eq!(
        now_playing.to_string(),
        "Now Playing: Track by Artist X from the album Album Y [12.5/245 seconds]"
    );
    assert!((now_playing.progress_percentage() - 12.5 / 245.0 * 100.0).abs() < 1e-9);

    let placeholder = NowPlaying::placeholder();
    assert_eq!(placeholder.title, "");
    assert_eq!(placeholder.artwork_url, DEFAULT_ARTWORK_PATH);
    assert_eq!(placeholder.progress_percentage(), 0.0);
}

#[test]
fn test_status_request_body() {
    assert_eq!(
        status_request_body("aa:bb:cc:dd:ee:ff"),
        json!({
            "method": "slim.request",
            "params": ["aa:bb:cc:dd:ee:ff", ["status", "-", 10, "tags:adKl"]],
            "id": 1
        })
    );
}

#[test]
fn test_server_settings_urls() {
    let settings = example_settings();
    assert_eq!(settings.base_url(), "http://10.0.0.5:9000");
    assert_eq!(settings.jsonrpc_url(), "http://10.0.0.5:9000/jsonrpc.js");
}
