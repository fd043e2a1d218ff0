use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Tool, string_arg};

fn song_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "song": {
                "type": "string",
                "description": "Title (and optionally artist) of the song"
            }
        },
        "required": ["song"]
    })
}

/// Simulated Spotify playback.
pub struct PlaySongOnSpotifyTool;

#[async_trait]
impl Tool for PlaySongOnSpotifyTool {
    fn name(&self) -> String {
        "play_song_on_spotify".to_string()
    }

    fn description(&self) -> String {
        "Play a song on Spotify".to_string()
    }

    fn parameters(&self) -> Value {
        song_parameters()
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let song = string_arg(&args, "song")?;
        Ok(Value::String(format!("Successfully played {} on Spotify!", song)))
    }
}

/// Simulated Apple Music playback.
pub struct PlaySongOnAppleTool;

#[async_trait]
impl Tool for PlaySongOnAppleTool {
    fn name(&self) -> String {
        "play_song_on_apple".to_string()
    }

    fn description(&self) -> String {
        "Play a song on Apple Music".to_string()
    }

    fn parameters(&self) -> Value {
        song_parameters()
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let song = string_arg(&args, "song")?;
        Ok(Value::String(format!(
            "Successfully played {} on Apple Music!",
            song
        )))
    }
}
