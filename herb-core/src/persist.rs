//! Save and load.
//!
//! One versioned JSON blob per playthrough. Saves bound the message log and
//! chronicle to a recent tail, loads are lenient about missing fields so an
//! older save from the same schema version still resumes, and a version
//! mismatch reads as "no save" rather than an error.

use crate::data::{build_characters, CharacterStats, Gender, NEW_MOON_COUNTDOWN};
use crate::engine::{GameState, Message, StoryRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;

/// Current save schema version.
pub const SAVE_VERSION: u32 = 1;

/// Recent-message window kept in the blob.
const MESSAGE_TAIL: usize = 30;

/// Chronicle entries kept in the blob.
const RECORD_TAIL: usize = 50;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn default_gender() -> Gender {
    Gender::Male
}

fn default_player_name() -> String {
    "灵芝".to_string()
}

fn default_scene() -> String {
    "cave".to_string()
}

fn default_chapter() -> u32 {
    1
}

fn default_countdown() -> u32 {
    NEW_MOON_COUNTDOWN
}

fn default_unlocked_scenes() -> Vec<String> {
    vec!["cave".to_string(), "outskirts".to_string()]
}

/// The serialized shape of one save blob.
#[derive(Debug, Serialize, Deserialize)]
struct SavedGame {
    version: u32,
    #[serde(default = "default_gender")]
    player_gender: Gender,
    #[serde(default = "default_player_name")]
    player_name: String,
    current_day: u32,
    current_period: usize,
    action_points: u32,
    #[serde(default = "default_scene")]
    current_scene: String,
    #[serde(default)]
    current_character: Option<String>,
    character_stats: HashMap<String, CharacterStats>,
    #[serde(default = "default_chapter")]
    current_chapter: u32,
    #[serde(default)]
    triggered_events: Vec<String>,
    #[serde(default = "default_unlocked_scenes")]
    unlocked_scenes: Vec<String>,
    #[serde(default)]
    pool_fragments: u32,
    #[serde(default = "default_countdown")]
    new_moon_countdown: u32,
    #[serde(default)]
    is_new_moon_night: bool,
    #[serde(default)]
    inventory: HashMap<String, u32>,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    history_summary: String,
    #[serde(default)]
    ending_id: Option<String>,
    #[serde(default)]
    choices: Vec<String>,
    #[serde(default)]
    story_records: Vec<StoryRecord>,
}

/// Just enough to check the version tag without a full deserialization.
#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: u32,
}

fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    let start = items.len().saturating_sub(n);
    items[start..].to_vec()
}

impl SavedGame {
    fn from_state(state: &GameState) -> Self {
        Self {
            version: SAVE_VERSION,
            player_gender: state.player_gender,
            player_name: state.player_name.clone(),
            current_day: state.current_day,
            current_period: state.current_period,
            action_points: state.action_points,
            current_scene: state.current_scene.clone(),
            current_character: state.current_character.clone(),
            character_stats: state.character_stats.clone(),
            current_chapter: state.current_chapter,
            triggered_events: state.triggered_events.clone(),
            unlocked_scenes: state.unlocked_scenes.clone(),
            pool_fragments: state.pool_fragments,
            new_moon_countdown: state.new_moon_countdown,
            is_new_moon_night: state.is_new_moon_night,
            inventory: state.inventory.clone(),
            messages: tail(&state.messages, MESSAGE_TAIL),
            history_summary: state.history_summary.clone(),
            ending_id: state.ending_id.clone(),
            choices: state.choices.clone(),
            story_records: tail(&state.story_records, RECORD_TAIL),
        }
    }

    /// Rebuild the aggregate. The roster is derived from the saved gender,
    /// never stored; transient turn fields start released.
    fn into_state(self) -> GameState {
        let characters = build_characters(self.player_gender);
        GameState {
            game_started: true,
            player_gender: self.player_gender,
            player_name: self.player_name,
            characters,
            current_day: self.current_day,
            current_period: self.current_period,
            action_points: self.action_points,
            current_scene: self.current_scene,
            current_character: self.current_character,
            character_stats: self.character_stats,
            current_chapter: self.current_chapter,
            triggered_events: self.triggered_events,
            unlocked_scenes: self.unlocked_scenes,
            pool_fragments: self.pool_fragments,
            new_moon_countdown: self.new_moon_countdown,
            is_new_moon_night: self.is_new_moon_night,
            inventory: self.inventory,
            messages: self.messages,
            history_summary: self.history_summary,
            is_typing: false,
            streaming_content: String::new(),
            ending_id: self.ending_id,
            choices: self.choices,
            story_records: self.story_records,
        }
    }
}

/// Durable single-blob store for one playthrough.
pub struct SaveStore {
    path: PathBuf,
}

impl SaveStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Write the current state as one blob, bounding the logs first.
    pub async fn save(&self, state: &GameState) -> Result<(), PersistError> {
        let blob = serde_json::to_string(&SavedGame::from_state(state))?;
        fs::write(&self.path, blob).await?;
        Ok(())
    }

    /// Read the blob back. Missing file, unreadable content, or a version
    /// mismatch all come back as `None`: a save that cannot be resumed is
    /// treated as absent.
    pub async fn load(&self) -> Result<Option<GameState>, PersistError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let probe: VersionProbe = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };
        if probe.version != SAVE_VERSION {
            return Ok(None);
        }

        match serde_json::from_str::<SavedGame>(&raw) {
            Ok(saved) => Ok(Some(saved.into_state())),
            Err(_) => Ok(None),
        }
    }

    /// Cheap resumability check: the blob exists and carries the current
    /// version tag.
    pub async fn has_save(&self) -> bool {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str::<VersionProbe>(&raw)
                .map(|p| p.version == SAVE_VERSION)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Delete the blob. Already-absent is fine.
    pub async fn clear(&self) {
        let _ = fs::remove_file(&self.path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn started() -> GameState {
        let mut state = GameState::new();
        state.set_player_info(Gender::Female, "青竹");
        state.start_game();
        state
    }

    fn store_in(dir: &TempDir) -> SaveStore {
        SaveStore::new(dir.path().join("save.json"))
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut state = started();
        state.current_day = 7;
        state.current_period = 3;
        state.pool_fragments = 2;
        state.triggered_events.push("danchenzi-invitation".to_string());
        state.unlock_scene("tianjicheng");
        state
            .character_stats
            .get_mut("yeqingshuang")
            .unwrap()
            .insert("affection".to_string(), 42);

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.player_name, "青竹");
        assert_eq!(loaded.player_gender, Gender::Female);
        assert_eq!(loaded.current_day, 7);
        assert_eq!(loaded.current_period, 3);
        assert_eq!(loaded.pool_fragments, 2);
        assert_eq!(loaded.character_stats["yeqingshuang"]["affection"], 42);
        assert!(loaded.unlocked_scenes.iter().any(|s| s == "tianjicheng"));
        assert!(loaded
            .triggered_events
            .iter()
            .any(|e| e == "danchenzi-invitation"));
        // Roster rebuilt for the saved gender.
        assert_eq!(loaded.characters["yeqingshuang"].gender, Gender::Male);
        assert!(!loaded.is_typing);
        assert!(loaded.streaming_content.is_empty());
    }

    #[tokio::test]
    async fn test_logs_truncated_to_tail() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut state = started();
        for i in 0..40 {
            state.add_system_message(format!("事件{i}"));
        }
        for i in 0..60 {
            state.push_record(format!("记录{i}"), "内容");
        }

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.messages.len(), 30);
        assert_eq!(loaded.messages.last().unwrap().content, "事件39");
        assert_eq!(loaded.story_records.len(), 50);
        assert_eq!(loaded.story_records.last().unwrap().title, "记录59");
    }

    #[tokio::test]
    async fn test_version_mismatch_reads_as_no_save() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        tokio::fs::write(store.path(), r#"{"version": 99}"#)
            .await
            .unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(!store.has_save().await);
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_blobs() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.load().await.unwrap().is_none());
        assert!(!store.has_save().await);

        tokio::fs::write(store.path(), "not json").await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.has_save().await);
    }

    #[tokio::test]
    async fn test_has_save_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&started()).await.unwrap();
        assert!(store.has_save().await);

        store.clear().await;
        assert!(!store.has_save().await);
        store.clear().await; // idempotent
    }

    #[tokio::test]
    async fn test_defaults_fill_missing_fields() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let minimal = r#"{
            "version": 1,
            "current_day": 4,
            "current_period": 2,
            "action_points": 5,
            "character_stats": {}
        }"#;
        tokio::fs::write(store.path(), minimal).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.current_day, 4);
        assert_eq!(loaded.player_name, "灵芝");
        assert_eq!(loaded.player_gender, Gender::Male);
        assert_eq!(loaded.new_moon_countdown, NEW_MOON_COUNTDOWN);
        assert_eq!(loaded.unlocked_scenes, vec!["cave", "outskirts"]);
        assert_eq!(loaded.current_chapter, 1);
    }
}
