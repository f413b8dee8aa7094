//! Testing utilities.
//!
//! - `MockNarrator` for deterministic turns without API calls
//! - `TestHarness` for scripted playthrough scenarios
//! - Assertion helpers for verifying game state

use crate::data::Gender;
use crate::engine::{GameState, TurnOutcome};

/// A scripted narrator: each accepted turn consumes the next queued response
/// and folds it through the real parse-and-apply step.
pub struct MockNarrator {
    responses: Vec<String>,
    response_index: usize,
}

impl MockNarrator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            response_index: 0,
        }
    }

    /// Add a response to the queue.
    pub fn queue_response(&mut self, response: impl Into<String>) {
        self.responses.push(response.into());
    }

    /// Run one turn against the aggregate with the next scripted response.
    pub fn run_turn(&mut self, state: &mut GameState, text: &str) -> TurnOutcome {
        if state.begin_turn(text) == TurnOutcome::Rejected {
            return TurnOutcome::Rejected;
        }

        let response = if self.response_index < self.responses.len() {
            let r = self.responses[self.response_index].clone();
            self.response_index += 1;
            r
        } else {
            "……（山风掠过，无事发生。）".to_string()
        };

        state.resolve_turn(text, &response);
        TurnOutcome::Accepted
    }

    /// Replay from the first scripted response.
    pub fn reset(&mut self) {
        self.response_index = 0;
    }
}

/// Harness for running scripted playthroughs against the real state machine.
pub struct TestHarness {
    pub narrator: MockNarrator,
    pub state: GameState,
}

impl TestHarness {
    /// Fresh playthrough with default player identity.
    pub fn new() -> Self {
        let mut state = GameState::new();
        state.start_game();
        Self {
            narrator: MockNarrator::new(Vec::new()),
            state,
        }
    }

    /// Fresh playthrough with explicit identity.
    pub fn with_player(gender: Gender, name: &str) -> Self {
        let mut state = GameState::new();
        state.set_player_info(gender, name);
        state.start_game();
        Self {
            narrator: MockNarrator::new(Vec::new()),
            state,
        }
    }

    /// Queue a narration response for the next turn.
    pub fn expect_narrative(&mut self, text: impl Into<String>) -> &mut Self {
        self.narrator.queue_response(text);
        self
    }

    /// Submit a player action through the mock narrator.
    pub fn action(&mut self, text: &str) -> TurnOutcome {
        self.narrator.run_turn(&mut self.state, text)
    }

    /// Advance whole periods.
    pub fn advance(&mut self, periods: usize) {
        for _ in 0..periods {
            self.state.advance_time();
        }
    }

    /// Advance day by day until the morning of `day`.
    pub fn advance_to_day(&mut self, day: u32) {
        while self.state.current_day < day && self.state.ending_id.is_none() {
            self.advance(crate::data::PERIODS.len() - self.state.current_period);
        }
    }

    pub fn stat(&self, char_id: &str, key: &str) -> i32 {
        self.state
            .character_stats
            .get(char_id)
            .and_then(|s| s.get(key))
            .copied()
            .unwrap_or(0)
    }

    /// Content of the last message in the log.
    pub fn last_message(&self) -> Option<&str> {
        self.state.messages.last().map(|m| m.content.as_str())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a character's stat holds an exact value.
#[track_caller]
pub fn assert_stat(harness: &TestHarness, char_id: &str, key: &str, expected: i32) {
    let actual = harness.stat(char_id, key);
    assert_eq!(
        actual, expected,
        "Expected {char_id}.{key} to be {expected}, got {actual}"
    );
}

/// Assert a scene is in the unlocked set.
#[track_caller]
pub fn assert_scene_unlocked(harness: &TestHarness, scene_id: &str) {
    assert!(
        harness.state.unlocked_scenes.iter().any(|s| s == scene_id),
        "Expected scene '{scene_id}' to be unlocked, have {:?}",
        harness.state.unlocked_scenes
    );
}

/// Assert a forced event has fired.
#[track_caller]
pub fn assert_event_triggered(harness: &TestHarness, event_id: &str) {
    assert!(
        harness.state.triggered_events.iter().any(|e| e == event_id),
        "Expected event '{event_id}' to be triggered, have {:?}",
        harness.state.triggered_events
    );
}

/// Assert the session ended with the given ending.
#[track_caller]
pub fn assert_ending(harness: &TestHarness, ending_id: &str) {
    assert_eq!(
        harness.state.ending_id.as_deref(),
        Some(ending_id),
        "Expected ending '{ending_id}', got {:?}",
        harness.state.ending_id
    );
}

/// Assert the session has no ending yet.
#[track_caller]
pub fn assert_no_ending(harness: &TestHarness) {
    assert_eq!(
        harness.state.ending_id, None,
        "Expected no ending, got {:?}",
        harness.state.ending_id
    );
}
