//! Import synced lyrics for every song that has no lines yet.
//!
//! Songs the lyrics service cannot match are logged and skipped.

use palabra_backend::config::Config;
use palabra_backend::services::lyrics;
use palabra_backend::store::SongStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    palabra_backend::init_tracing();

    let state = palabra_backend::build_state(config).await?;

    let mut imported = 0;
    let mut skipped = 0;
    for song in state.store.list_songs().await? {
        if !state.store.song_lines(song.id).await?.is_empty() {
            continue;
        }
        match lyrics::import_lyrics(&state, song.id).await {
            Ok(lines) => {
                imported += 1;
                tracing::info!(song_id = song.id, title = %song.title, lines = lines.len(), "imported");
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(song_id = song.id, title = %song.title, error = %e, "skipped");
            }
        }
    }

    tracing::info!(imported, skipped, "lyrics fetch finished");
    Ok(())
}
