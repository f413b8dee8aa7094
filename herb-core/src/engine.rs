//! The game state machine.
//!
//! [`GameState`] is the single mutable aggregate for a playthrough. Every
//! transition is a named method here; nothing else mutates the aggregate.
//! All methods are synchronous and do no I/O; the async narration loop
//! lives in [`crate::narrator`], persistence in [`crate::persist`].

use crate::data::{
    self, build_characters, build_initial_stats, Character, CharacterStats, Gender, ENDINGS,
    ITEMS, ItemType, MAX_ACTION_POINTS, MAX_DAYS, NEW_MOON_COUNTDOWN, NIGHT_PERIOD, PERIODS,
    SCENES, STARTING_INVENTORY, STARTING_SCENES, TimePeriod,
};
use crate::parser::{self, StatDelta};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Initial choice list shown right after the opening narration.
const OPENING_CHOICES: [&str; 4] = [
    "探索山洞深处",
    "走出洞口看看外面",
    "端详自己的人形身体",
    "闭目感受体内灵气",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Rich tag carried by some system messages so the rendering layer can show
/// them as banners instead of chat bubbles. Tagged messages never enter the
/// prompt history window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessageKind {
    SceneTransition { scene_id: String },
    PeriodChange { day: u32, period: String, chapter: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// Speaking character, for NPC bubbles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            character: None,
            timestamp: now_millis(),
            kind: None,
        }
    }
}

/// One entry in the playthrough chronicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryRecord {
    pub id: Uuid,
    pub day: u32,
    pub period: String,
    pub title: String,
    pub content: String,
}

/// Whether a submitted action was accepted for narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Accepted,
    /// A turn is already in flight, or the game has ended.
    Rejected,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn truncate_chars(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        s.to_string()
    } else {
        let head: String = s.chars().take(n).collect();
        format!("{head}...")
    }
}

/// The root aggregate for one playthrough.
#[derive(Debug, Clone)]
pub struct GameState {
    pub game_started: bool,
    pub player_gender: Gender,
    pub player_name: String,
    /// Roster, rebuilt from `player_gender` at game start and on load.
    pub characters: HashMap<String, Character>,
    pub current_day: u32,
    pub current_period: usize,
    pub action_points: u32,
    pub current_scene: String,
    pub current_character: Option<String>,
    pub character_stats: HashMap<String, CharacterStats>,
    pub current_chapter: u32,
    /// Insertion-ordered; membership is checked, order is shown in prompts.
    pub triggered_events: Vec<String>,
    pub unlocked_scenes: Vec<String>,
    pub pool_fragments: u32,
    pub new_moon_countdown: u32,
    pub is_new_moon_night: bool,
    pub inventory: HashMap<String, u32>,
    pub messages: Vec<Message>,
    pub history_summary: String,
    pub is_typing: bool,
    /// Live accumulation of the in-flight stream, display only.
    pub streaming_content: String,
    pub ending_id: Option<String>,
    pub choices: Vec<String>,
    pub story_records: Vec<StoryRecord>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            game_started: false,
            player_gender: Gender::Male,
            player_name: "灵芝".to_string(),
            characters: HashMap::new(),
            current_day: 1,
            current_period: 0,
            action_points: MAX_ACTION_POINTS,
            current_scene: "cave".to_string(),
            current_character: None,
            character_stats: HashMap::new(),
            current_chapter: 1,
            triggered_events: Vec::new(),
            unlocked_scenes: Vec::new(),
            pool_fragments: 0,
            new_moon_countdown: NEW_MOON_COUNTDOWN,
            is_new_moon_night: false,
            inventory: HashMap::new(),
            messages: Vec::new(),
            history_summary: String::new(),
            is_typing: false,
            streaming_content: String::new(),
            ending_id: None,
            choices: Vec::new(),
            story_records: Vec::new(),
        }
    }
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set player identity before [`start_game`](Self::start_game). An empty
    /// name falls back to the default.
    pub fn set_player_info(&mut self, gender: Gender, name: &str) {
        self.player_gender = gender;
        self.player_name = if name.trim().is_empty() {
            "灵芝".to_string()
        } else {
            name.trim().to_string()
        };
    }

    /// Begin a fresh playthrough: build the roster for the chosen gender,
    /// reset every counter, seed the opening narration and choices.
    pub fn start_game(&mut self) {
        let characters = build_characters(self.player_gender);
        let stats = build_initial_stats(&characters);

        self.game_started = true;
        self.characters = characters;
        self.current_day = 1;
        self.current_period = 0;
        self.action_points = MAX_ACTION_POINTS;
        self.current_scene = "cave".to_string();
        self.current_character = None;
        self.character_stats = stats;
        self.current_chapter = 1;
        self.triggered_events = Vec::new();
        self.unlocked_scenes = STARTING_SCENES.iter().map(|s| s.to_string()).collect();
        self.pool_fragments = 0;
        self.new_moon_countdown = NEW_MOON_COUNTDOWN;
        self.is_new_moon_night = false;
        self.inventory = STARTING_INVENTORY
            .iter()
            .map(|(id, n)| (id.to_string(), *n))
            .collect();
        self.messages = Vec::new();
        self.history_summary = String::new();
        self.is_typing = false;
        self.streaming_content = String::new();
        self.ending_id = None;
        self.story_records = Vec::new();

        self.messages.push(Message::new(
            MessageRole::System,
            format!(
                "天元历三千七百年，一株千年九叶灵芝终于化形成人。\n\n\
                 你睁开眼睛，第一次以人类的视角打量这个世界。空气中弥漫着自己身上的药香，\
                 洞顶的裂缝透进一缕微弱的光线。\n\n\
                 你叫「{}」，从今天起，你要学会在修仙界生存。",
                self.player_name
            ),
        ));
        self.push_record("九叶灵芝化形", format!("{}在隐秘山洞中化形成人，修仙之旅开始。", self.player_name));

        self.choices = OPENING_CHOICES.iter().map(|c| c.to_string()).collect();
    }

    /// Drop back to the pre-game state. The persisted save is the session's
    /// concern.
    pub fn reset(&mut self) {
        *self = Self {
            player_gender: self.player_gender,
            player_name: self.player_name.clone(),
            ..Self::default()
        };
    }

    pub fn period(&self) -> &'static TimePeriod {
        PERIODS.get(self.current_period).unwrap_or(&PERIODS[0])
    }

    pub fn focused_character(&self) -> Option<&Character> {
        self.current_character
            .as_deref()
            .and_then(|id| self.characters.get(id))
    }

    pub fn select_character(&mut self, id: Option<String>) {
        self.current_character = id.filter(|id| self.characters.contains_key(id));
    }

    /// Move to an unlocked scene. Locked or already-current targets are
    /// silently ignored.
    pub fn select_scene(&mut self, id: &str) {
        if !self.unlocked_scenes.iter().any(|s| s == id) || self.current_scene == id {
            return;
        }
        let Some(scene) = SCENES.get(id) else { return };

        self.current_scene = id.to_string();
        let mut msg = Message::new(
            MessageRole::System,
            format!("你来到了{}。{}", scene.name, scene.atmosphere),
        );
        msg.kind = Some(MessageKind::SceneTransition { scene_id: id.to_string() });
        self.messages.push(msg);
    }

    /// Add a scene to the unlocked set. Monotonic: already-unlocked ids are
    /// ignored.
    pub fn unlock_scene(&mut self, id: &str) {
        if self.unlocked_scenes.iter().any(|s| s == id) {
            return;
        }
        self.unlocked_scenes.push(id.to_string());
        if let Some(scene) = SCENES.get(id) {
            self.add_system_message(format!("新场景解锁：{} {}", scene.icon, scene.name));
        }
    }

    pub fn add_system_message(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(MessageRole::System, content));
    }

    pub fn push_record(&mut self, title: impl Into<String>, content: impl Into<String>) {
        self.story_records.push(StoryRecord {
            id: Uuid::new_v4(),
            day: self.current_day,
            period: self.period().name.to_string(),
            title: title.into(),
            content: content.into(),
        });
    }

    /// Apply parsed stat deltas, clamping every stored value to [0,100].
    pub fn apply_deltas(&mut self, deltas: &[StatDelta]) {
        for d in deltas {
            if let Some(stats) = self.character_stats.get_mut(&d.char_id) {
                let value = stats.entry(d.stat_key.clone()).or_insert(0);
                *value = (*value + d.delta).clamp(0, 100);
            }
        }
    }

    // ── Turn lifecycle ──────────────────────────────────────────────

    /// Accept a player action for narration. Rejected while a turn is in
    /// flight or after an ending: the caller must not start a model call.
    pub fn begin_turn(&mut self, text: &str) -> TurnOutcome {
        if self.is_typing || self.ending_id.is_some() {
            return TurnOutcome::Rejected;
        }
        self.messages.push(Message::new(MessageRole::User, text));
        self.is_typing = true;
        self.streaming_content.clear();
        TurnOutcome::Accepted
    }

    /// Fold one complete model response into state. This is the single
    /// authoritative parse-and-apply step: deltas clamped in, cleaned
    /// narrative appended with the detected speaker, choices replaced (or
    /// synthesized), chronicle updated, then the shared rule evaluation.
    pub fn resolve_turn(&mut self, action_text: &str, response: &str) {
        let parsed = parser::parse(response, &self.characters);
        let extracted = parser::extract_choices(response);

        self.apply_deltas(&parsed.stat_deltas);

        let speaker = parsed.speaker_id.or_else(|| self.current_character.clone());
        let mut msg = Message::new(MessageRole::Assistant, extracted.clean_text.clone());
        msg.character = speaker;
        self.messages.push(msg);

        let mut choices = if extracted.choices.len() >= 2 {
            extracted.choices
        } else {
            self.fallback_choices()
        };
        choices.truncate(4);
        self.choices = choices;

        self.push_record(
            truncate_chars(action_text, 20),
            truncate_chars(&extracted.clean_text, 100),
        );

        self.is_typing = false;
        self.streaming_content.clear();

        self.run_rule_checks();
    }

    /// Recover from a failed narration call: a canned in-world line instead
    /// of an error, and `is_typing` released.
    pub fn fail_turn(&mut self) {
        let (content, character) = match self.focused_character() {
            Some(c) => (
                format!("【{}】（似乎感知到了什么）\"...风向变了。\"", c.name),
                Some(c.id.to_string()),
            ),
            None => (
                "一阵灵气波动掠过，山洞中的青苔微微发光。".to_string(),
                None,
            ),
        };
        let mut msg = Message::new(MessageRole::Assistant, content);
        msg.character = character;
        self.messages.push(msg);
        self.is_typing = false;
        self.streaming_content.clear();
    }

    /// Canned narration candidates for an empty model response.
    pub fn fallback_lines(&self) -> Vec<String> {
        match self.focused_character() {
            Some(c) => vec![
                format!("【{}】（看了看你，微微挑眉）\"嗯？\"", c.name),
                format!("【{}】（负手而立）\"风起了。\"", c.name),
                format!("【{}】（目光深远）\"你的灵气...有些不稳。\"", c.name),
            ],
            None => vec![
                "山风穿过洞口，带来一阵草木的清香。空气中弥漫着你自己的药香。".to_string(),
                "远处传来鸟鸣声，落霞山脉的天空被晚霞染成了金红色。".to_string(),
                "洞顶的裂缝透进一缕月光，你感到体内的灵气微微波动。".to_string(),
            ],
        }
    }

    /// Context-aware choices when the model supplied fewer than two.
    fn fallback_choices(&self) -> Vec<String> {
        if let Some(c) = self.focused_character() {
            return vec![
                format!("继续和{}交谈", c.name),
                format!("试探{}的真实目的", c.name),
                format!("向{}寻求帮助", c.name),
                "换个话题".to_string(),
            ];
        }
        let scene_name = SCENES
            .get(self.current_scene.as_str())
            .map(|s| s.name)
            .unwrap_or("周围");
        vec![
            format!("探索{scene_name}"),
            "寻找化形池线索".to_string(),
            "查看周围环境".to_string(),
            "使用隐匿符掩盖气息".to_string(),
        ]
    }

    // ── Time ────────────────────────────────────────────────────────

    /// Advance one time period, wrapping into a new day: action points
    /// restored, new-moon countdown decremented, per-day stat drift applied,
    /// chapter recomputed, then the shared rule evaluation. On the final
    /// period of the final day the full ending table runs.
    pub fn advance_time(&mut self) {
        self.current_period += 1;

        if self.current_period >= PERIODS.len() {
            self.current_period = 0;
            self.current_day += 1;
            self.action_points = MAX_ACTION_POINTS;

            // The flag tracks the exhausted countdown: once the new moon
            // arrives it stays in effect through the end of the run.
            self.new_moon_countdown = self.new_moon_countdown.saturating_sub(1);
            self.is_new_moon_night = self.new_moon_countdown == 0;

            self.apply_daily_drift();

            let chapter = data::current_chapter(self.current_day);
            let period = &PERIODS[0];
            let mut msg = Message::new(
                MessageRole::System,
                format!("第{}天 · {}", self.current_day, period.name),
            );
            msg.kind = Some(MessageKind::PeriodChange {
                day: self.current_day,
                period: period.name.to_string(),
                chapter: chapter.name.to_string(),
            });
            self.messages.push(msg);

            let countdown_note = if self.new_moon_countdown <= 3 {
                format!(" · 朔月倒计时{}天", self.new_moon_countdown)
            } else {
                String::new()
            };
            self.push_record(
                format!("进入第{}天", self.current_day),
                format!("{} · {}{countdown_note}", chapter.name, period.name),
            );
        } else {
            let chapter = data::current_chapter(self.current_day);
            let period = &PERIODS[self.current_period];
            let mut msg = Message::new(
                MessageRole::System,
                format!("第{}天 · {}", self.current_day, period.name),
            );
            msg.kind = Some(MessageKind::PeriodChange {
                day: self.current_day,
                period: period.name.to_string(),
                chapter: chapter.name.to_string(),
            });
            self.messages.push(msg);
        }

        let chapter = data::current_chapter(self.current_day);
        if chapter.id != self.current_chapter {
            self.current_chapter = chapter.id;
            self.add_system_message(format!(
                "— 第{}章「{}」—\n{}",
                chapter.id, chapter.name, chapter.description
            ));
        }

        if self.is_new_moon_night && self.current_period == NIGHT_PERIOD {
            self.add_system_message("朔月之夜降临！月亮不会升起。你感到体内灵气剧烈波动...");
        }

        self.run_rule_checks();

        if self.ending_id.is_none()
            && self.current_day >= MAX_DAYS
            && self.current_period == PERIODS.len() - 1
        {
            self.check_ending();
        }
    }

    /// Per-day stat drift declared in StatMeta: `auto_increment` pushes a
    /// value up, `decay_rate` pulls it down, both clamped.
    fn apply_daily_drift(&mut self) {
        for (id, character) in &self.characters {
            let Some(stats) = self.character_stats.get_mut(id) else {
                continue;
            };
            for meta in character.stat_metas {
                let value = stats.entry(meta.key.to_string()).or_insert(0);
                if let Some(inc) = meta.auto_increment {
                    *value = (*value + inc).clamp(0, 100);
                }
                if let Some(decay) = meta.decay_rate {
                    *value = (*value - decay).clamp(0, 100);
                }
            }
        }
    }

    // ── Items ───────────────────────────────────────────────────────

    /// Spend or read an item. Out-of-stock use produces an informational
    /// line; per-item side effects are a closed table keyed by item id.
    pub fn use_item(&mut self, item_id: &str) {
        let Some(item) = ITEMS.get(item_id) else { return };

        let count = self.inventory.get(item_id).copied().unwrap_or(0);
        if count == 0 {
            self.add_system_message(format!("你没有 {} 了。", item.name));
            return;
        }

        if item.item_type == ItemType::Consumable {
            if let Some(n) = self.inventory.get_mut(item_id) {
                *n = n.saturating_sub(1);
            }
        }

        match item_id {
            "concealment-talisman" => {
                if let Some(stats) = self.character_stats.get_mut("danchenzi") {
                    let value = stats.entry("coveting".to_string()).or_insert(0);
                    *value = (*value - 10).clamp(0, 100);
                }
                self.add_system_message(
                    "你点燃隐匿符，符纸化作一道青烟笼罩全身。本体气息暂时被掩盖。【丹辰子 觊觎-10】",
                );
            }
            "elder-diary" => {
                self.add_system_message(
                    "你翻开灵草前辈的日记，前辈的字迹映入眼帘——\"化形池...并非你所想的那样...\"",
                );
            }
            _ => {}
        }
    }

    /// Add an item to the inventory, capped at its `max_count`.
    pub fn gain_item(&mut self, item_id: &str) {
        let Some(item) = ITEMS.get(item_id) else { return };
        let count = self.inventory.entry(item_id.to_string()).or_insert(0);
        if *count < item.max_count {
            *count += 1;
        }
        if item_id == "pool-fragment" {
            self.pool_fragments = (self.pool_fragments + 1).min(3);
        }
    }

    // ── Rule evaluation ─────────────────────────────────────────────

    /// Shared post-transition evaluation: scene unlocks, due forced events,
    /// and the priority bad-ending threshold. Runs after every resolved turn
    /// and every time advance.
    pub fn run_rule_checks(&mut self) {
        // Forced events due now.
        let due: Vec<&'static data::ForcedEvent> =
            data::pending_day_events(self.current_day, &self.triggered_events)
                .into_iter()
                .filter(|e| {
                    e.trigger_period.is_none() || e.trigger_period == Some(self.current_period)
                })
                .collect();
        for event in due {
            self.triggered_events.push(event.id.to_string());
            self.add_system_message(format!("【{}】{}", event.name, event.description));
            self.push_record(event.name, event.description);
        }

        // Scene unlocks, monotonic.
        let newly_unlocked: Vec<&'static str> = SCENES
            .values()
            .filter(|scene| {
                !self.unlocked_scenes.iter().any(|s| s == scene.id)
                    && data::scene_unlockable(scene, &self.triggered_events, &self.character_stats)
            })
            .map(|scene| scene.id)
            .collect();
        for id in newly_unlocked {
            self.unlock_scene(id);
        }

        // Priority bad ending: coveting at its cap ends the run immediately,
        // never waiting for the final day.
        if self.stat("danchenzi", "coveting") >= 100 {
            self.set_ending("be-alchemy");
        }
    }

    fn stat(&self, char_id: &str, key: &str) -> i32 {
        self.character_stats
            .get(char_id)
            .and_then(|s| s.get(key))
            .copied()
            .unwrap_or(0)
    }

    /// Set the terminal ending. At most one per session: later candidates
    /// are rejected.
    pub fn set_ending(&mut self, id: &str) {
        if self.ending_id.is_some() {
            return;
        }
        self.ending_id = Some(id.to_string());
        if let Some(ending) = ENDINGS.iter().find(|e| e.id == id) {
            self.add_system_message(format!("【{}】{}", ending.name, ending.description));
        }
    }

    /// Evaluate the full ending table in priority order. Called at the final
    /// day/period boundary; `be-alchemy` can also fire earlier via
    /// [`run_rule_checks`](Self::run_rule_checks).
    pub fn check_ending(&mut self) {
        if self.ending_id.is_some() {
            return;
        }

        if self.stat("danchenzi", "coveting") >= 100 {
            self.set_ending("be-alchemy");
            return;
        }

        if self.is_new_moon_night
            && !self.triggered_events.iter().any(|e| e == "new-moon-night")
        {
            let max_affection = self
                .stat("yeqingshuang", "affection")
                .max(self.stat("chili", "affection"));
            if max_affection < 30 {
                self.set_ending("be-prey");
                return;
            }
        }

        if self.stat("yeqingshuang", "affection") >= 80
            && self.stat("yeqingshuang", "trust") >= 60
            && self.pool_fragments >= 3
            && self.triggered_events.iter().any(|e| e == "yeqingshuang-truth")
        {
            self.set_ending("te-true-person");
            return;
        }

        if self.stat("chili", "affection") >= 80 && self.stat("chili", "assimilation") >= 60 {
            self.set_ending("he-demon-flower");
            return;
        }

        self.set_ending("ne-half");
    }
}
