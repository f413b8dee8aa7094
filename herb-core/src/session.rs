//! Session management: one playthrough end to end.
//!
//! [`GameSession`] owns the aggregate, the narrator and the save store, and
//! is the only mutation path a rendering layer gets. Every state change bumps
//! a revision counter published over a `tokio::sync::watch` channel, so
//! observers re-read the state snapshot instead of poking fields.

use crate::data::Gender;
use crate::engine::{GameState, TurnOutcome};
use crate::narrator::Narrator;
use crate::persist::SaveStore;
use tokio::sync::watch;

pub struct GameSession {
    state: GameState,
    narrator: Narrator,
    store: SaveStore,
    revision: watch::Sender<u64>,
}

impl GameSession {
    pub fn new(narrator: Narrator, store: SaveStore) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: GameState::new(),
            narrator,
            store,
            revision,
        }
    }

    /// Read-only snapshot of the aggregate.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Change notifications: the value is a monotonically increasing
    /// revision; on each bump observers re-read [`state`](Self::state).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Persistence is best-effort: a failed write never interrupts play.
    async fn autosave(&self) {
        let _ = self.store.save(&self.state).await;
    }

    pub fn set_player_info(&mut self, gender: Gender, name: &str) {
        self.state.set_player_info(gender, name);
        self.notify();
    }

    pub async fn start_game(&mut self) {
        self.state.start_game();
        self.autosave().await;
        self.notify();
    }

    pub fn select_character(&mut self, id: Option<String>) {
        self.state.select_character(id);
        self.notify();
    }

    pub fn select_scene(&mut self, id: &str) {
        self.state.select_scene(id);
        self.notify();
    }

    pub fn use_item(&mut self, item_id: &str) {
        self.state.use_item(item_id);
        self.notify();
    }

    /// Submit a player action for narration. At most one turn is in flight:
    /// a second submission, or one after an ending, is rejected without a
    /// model call. Observers are notified on every streamed chunk.
    pub async fn submit_action(&mut self, text: &str) -> TurnOutcome {
        let outcome = {
            let narrator = &self.narrator;
            let revision = &self.revision;
            let state = &mut self.state;
            narrator
                .run_turn(state, text, |_| revision.send_modify(|r| *r += 1))
                .await
        };

        if outcome == TurnOutcome::Accepted {
            self.autosave().await;
        }
        self.notify();
        outcome
    }

    pub async fn advance_time(&mut self) {
        self.state.advance_time();
        self.autosave().await;
        self.notify();
    }

    /// Resume from the save blob. `false` when there is nothing resumable.
    pub async fn load_game(&mut self) -> bool {
        match self.store.load().await {
            Ok(Some(state)) => {
                self.state = state;
                self.notify();
                true
            }
            _ => false,
        }
    }

    pub async fn has_save(&self) -> bool {
        self.store.has_save().await
    }

    /// Back to the pre-game state, dropping the save blob.
    pub async fn reset(&mut self) {
        self.state.reset();
        self.store.clear().await;
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session_in(dir: &TempDir) -> GameSession {
        let narrator = Narrator::new(ark::Ark::new("test-key"));
        let store = SaveStore::new(dir.path().join("save.json"));
        GameSession::new(narrator, store)
    }

    #[tokio::test]
    async fn test_start_game_autosaves() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);

        assert!(!session.has_save().await);
        session.set_player_info(Gender::Male, "小芝");
        session.start_game().await;
        assert!(session.has_save().await);
        assert_eq!(session.state().player_name, "小芝");
    }

    #[tokio::test]
    async fn test_load_resumes_saved_state() {
        let dir = TempDir::new().unwrap();

        {
            let mut session = session_in(&dir);
            session.start_game().await;
            session.advance_time().await;
        }

        let mut resumed = session_in(&dir);
        assert!(resumed.load_game().await);
        assert_eq!(resumed.state().current_period, 1);
    }

    #[tokio::test]
    async fn test_reset_clears_save() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        session.start_game().await;

        session.reset().await;
        assert!(!session.has_save().await);
        assert!(!session.state().game_started);
        assert!(!session.load_game().await);
    }

    #[tokio::test]
    async fn test_revision_bumps_on_mutation() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir);
        let rx = session.subscribe();

        let before = *rx.borrow();
        session.start_game().await;
        session.select_scene("outskirts");
        assert!(*rx.borrow() > before);
    }
}
