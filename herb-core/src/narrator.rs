//! The async narration loop.
//!
//! One turn: guard, optional history compression, prompt build, a streamed
//! completion call with retries, then exactly one parse-and-apply pass over
//! the fully assembled text. Chunks only ever feed the transient streaming
//! buffer; state mutation happens on completion. A turn never surfaces a
//! service error to the player: empty output gets a canned narration line,
//! failure gets [`GameState::fail_turn`].

use crate::engine::{GameState, TurnOutcome};
use crate::prompt;
use ark::{Ark, ChatMessage, Request, StreamEvent};
use futures::StreamExt;
use rand::Rng;

/// Attempts per narration call before the fallback line is substituted.
const MAX_ATTEMPTS: u32 = 3;

pub struct Narrator {
    client: Ark,
    max_attempts: u32,
}

impl Narrator {
    pub fn new(client: Ark) -> Self {
        Self {
            client,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Client configured from `ARK_API_KEY`.
    pub fn from_env() -> Result<Self, ark::Error> {
        Ok(Self::new(Ark::from_env()?))
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Drive one complete turn against the aggregate. `on_chunk` sees every
    /// streamed fragment (for live display); it must not touch game state.
    pub async fn run_turn(
        &self,
        state: &mut GameState,
        text: &str,
        mut on_chunk: impl FnMut(&str),
    ) -> TurnOutcome {
        if state.begin_turn(text) == TurnOutcome::Rejected {
            return TurnOutcome::Rejected;
        }

        // Best-effort: a failed summary leaves history uncompressed and is
        // retried on a later turn.
        if prompt::needs_compression(state) {
            if let Some(request) = prompt::compression_request(state) {
                if let Ok(summary) = self.summarize(&request).await {
                    if !summary.is_empty() {
                        state.history_summary = summary;
                    }
                }
            }
        }

        let messages = prompt::build(state);
        let mut result: Result<String, ark::Error> =
            Err(ark::Error::Config("no attempts made".to_string()));

        for _ in 0..self.max_attempts {
            // A failed attempt leaves a partial buffer behind; start clean.
            state.streaming_content.clear();
            let streaming = &mut state.streaming_content;
            match self
                .stream_once(messages.clone(), &mut |chunk: &str| {
                    streaming.push_str(chunk);
                    on_chunk(chunk);
                })
                .await
            {
                Ok(text) => {
                    result = Ok(text);
                    break;
                }
                Err(e) => result = Err(e),
            }
        }

        match result {
            Ok(response) if response.is_empty() => {
                let line = pick(&state.fallback_lines());
                state.resolve_turn(text, &line);
            }
            Ok(response) => state.resolve_turn(text, &response),
            Err(_) => state.fail_turn(),
        }

        TurnOutcome::Accepted
    }

    async fn stream_once(
        &self,
        messages: Vec<ChatMessage>,
        on_chunk: &mut impl FnMut(&str),
    ) -> Result<String, ark::Error> {
        let mut stream = self.client.stream(Request::new(messages)).await?;
        let mut full = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::ContentDelta { text } => {
                    full.push_str(&text);
                    on_chunk(&text);
                }
                StreamEvent::Done => break,
            }
        }
        Ok(full)
    }

    /// One non-streaming call used for history compression.
    pub async fn summarize(&self, request: &str) -> Result<String, ark::Error> {
        self.client
            .complete(Request::new(vec![ChatMessage::user(request)]))
            .await
    }
}

fn pick(candidates: &[String]) -> String {
    let idx = rand::thread_rng().gen_range(0..candidates.len());
    candidates[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_returns_a_candidate() {
        let lines = vec!["甲".to_string(), "乙".to_string(), "丙".to_string()];
        for _ in 0..20 {
            let chosen = pick(&lines);
            assert!(lines.contains(&chosen));
        }
    }

    #[test]
    fn test_attempts_floor() {
        let narrator = Narrator::new(Ark::new("test-key")).with_attempts(0);
        assert_eq!(narrator.max_attempts, 1);
    }
}
