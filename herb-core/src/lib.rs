//! Narrative-state engine for 《灵草修仙录》, a xianxia text adventure.
//!
//! This crate provides:
//! - The full domain catalog: characters, scenes, items, chapters, forced
//!   events, endings, time periods
//! - A lenient parser turning model output into stat deltas, speaker
//!   attribution, rendered narrative and player choices
//! - A deterministic prompt builder with rolling history compression
//! - The game state machine: the single aggregate and every transition
//! - Versioned single-blob save files
//!
//! # Quick Start
//!
//! ```ignore
//! use herb_core::{GameSession, Narrator, SaveStore};
//! use herb_core::data::Gender;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let narrator = Narrator::from_env()?;
//!     let store = SaveStore::new("save.json");
//!     let mut session = GameSession::new(narrator, store);
//!
//!     session.set_player_info(Gender::Male, "灵芝");
//!     session.start_game().await;
//!
//!     session.submit_action("走出洞口看看外面").await;
//!     println!("{}", session.state().messages.last().unwrap().content);
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod engine;
pub mod narrator;
pub mod parser;
pub mod persist;
pub mod prompt;
pub mod session;
pub mod testing;

// Primary public API
pub use engine::{GameState, Message, MessageKind, MessageRole, StoryRecord, TurnOutcome};
pub use narrator::Narrator;
pub use persist::{PersistError, SaveStore};
pub use session::GameSession;
pub use testing::{MockNarrator, TestHarness};
