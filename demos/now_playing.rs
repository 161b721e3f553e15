use std::error::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lms_now_playing::{ConnectionState, StatusSync};

/// Prints the Now Playing line of an LMS player until Ctrl-C.
///
/// Configure with `LMS_SERVER`, `LMS_PORT`, `LMS_TELNET_PORT` and
/// `LMS_PLAYER_ID` (a `.env` file works too).
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let sync = StatusSync::from_env();
    sync.set_update_callback(|now_playing, playlist| match now_playing {
        Some(track) => {
            println!("{}", track);
            println!("  artwork: {}", track.artwork_url);
            for (i, entry) in playlist.iter().enumerate().skip(1) {
                println!("  {:>2}. {} - {}", i, entry.artist, entry.title);
            }
        }
        None => println!("Nothing playing"),
    })
    .await;

    // Show something before the first notification arrives
    sync.refresh_now().await;
    sync.start().await;

    let mut state = sync.connection_state_receiver();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = state.borrow().clone();
            info!("Event stream: {:?}", current);
            if current == ConnectionState::Stopped {
                break;
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");
    sync.close().await;
    Ok(())
}
