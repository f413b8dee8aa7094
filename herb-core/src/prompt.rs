//! Prompt construction.
//!
//! Pure functions from a state snapshot to the exact message list sent to
//! the completion service. No I/O, no mutation: the narrator decides when to
//! call and what to do with the result.

use crate::data::{
    self, Character, Gender, ITEMS, MAX_ACTION_POINTS, MAX_DAYS, SCENES, STORY_INFO,
};
use crate::engine::{GameState, MessageRole};
use ark::ChatMessage;

/// Message count beyond which older history is compressed into a summary.
pub const HISTORY_COMPRESS_THRESHOLD: usize = 15;

/// Raw messages kept verbatim at the end of the prompt window.
pub const RECENT_WINDOW: usize = 10;

/// The narrator's standing brief: world rules, cast, and output protocol.
const GAME_SCRIPT: &str = "\
## 世界观
天元历三千七百年，修仙界以人为尊。灵草灵兽一旦成精化形，便是人人觊觎的\"天材地宝\"——\
修士取其本体炼丹，妖族诱其入籍。传说万妖森林深处有一座化形池，可令灵物褪去本体、真正成人。

## 玩家身份
玩家是一株千年九叶灵芝，刚刚化形。本体气息会吸引修士，朔月之夜会短暂显露原形。

## 叙事规则
1. 以第二人称沉浸式叙述，每次回复200-400字，古风文白相间。
2. 角色台词以【角色名】开头，动作用（）包裹，对白用\"\"包裹。
3. 数值变化单独成行，格式如【叶青霜】好感+10 或【觊觎+5】，幅度1-15。
4. 玩家获得物品时单独一行：【获得 物品名 x1】。
5. 回复末尾给出2-4个编号选项（1. 2. 3.），前加一行\"你的选择：\"。
6. 按各角色的行为模式与触发点驱动剧情，不替玩家做决定，不剧透角色秘密。";

fn gender_framing(gender: Gender) -> (&'static str, &'static str) {
    match gender {
        Gender::Male => ("少年", "（NPC称呼: 公子/小兄弟/道友/小友）"),
        Gender::Female => ("少女", "（NPC称呼: 姑娘/妹妹/仙子/小姑娘）"),
    }
}

fn stat_summary(state: &GameState, character: &Character) -> String {
    let stats = state.character_stats.get(character.id);
    character
        .stat_metas
        .iter()
        .map(|m| {
            let value = stats.and_then(|s| s.get(m.key)).copied().unwrap_or(0);
            format!("{}{}", m.label, value)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The full system prompt: standing brief, then the current snapshot —
/// calendar, scene, roster stats, focused-character block, inventory,
/// triggered events, and the rolling history summary.
pub fn build_system_prompt(state: &GameState, focused: Option<&Character>) -> String {
    let period = state.period();
    let scene = SCENES.get(state.current_scene.as_str());
    let chapter = data::current_chapter(state.current_day);
    let visible = data::available_characters(state.current_day, &state.characters);

    let (gender_label, gender_call) = gender_framing(state.player_gender);

    let all_stats = visible
        .iter()
        .map(|c| {
            let gender = if c.gender == Gender::Female { "女" } else { "男" };
            format!("{}({}): {}", c.name, gender, stat_summary(state, c))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let scene_line = scene
        .map(|s| format!("{} {} — {}", s.icon, s.name, s.description))
        .unwrap_or_else(|| state.current_scene.clone());

    let mut prompt = format!(
        "你是《{title}》的AI叙述者。\n\n\
         ## 游戏剧本\n{script}\n\n\
         ## 当前状态\n\
         玩家「{name}」是一株千年九叶灵芝，化形为{gender_label}。{gender_call}\n\
         第{day}/{max_days}天 · {period}\n\
         第{chapter_id}章「{chapter_name}」(Day {range_from}-{range_to})\n\
         当前场景：{scene_line}\n\
         行动力：{ap}/{max_ap}\n\
         朔月倒计时：{countdown}天\n\
         已解锁场景：{scenes}\n\
         化形池线索碎片：{fragments}/3{night}",
        title = STORY_INFO.title,
        script = GAME_SCRIPT,
        name = state.player_name,
        day = state.current_day,
        max_days = MAX_DAYS,
        period = period.name,
        chapter_id = chapter.id,
        chapter_name = chapter.name,
        range_from = chapter.day_range.0,
        range_to = chapter.day_range.1,
        ap = state.action_points,
        max_ap = MAX_ACTION_POINTS,
        countdown = state.new_moon_countdown,
        scenes = state.unlocked_scenes.join("、"),
        fragments = state.pool_fragments,
        night = if state.is_new_moon_night {
            "\n⚠️ 当前是朔月之夜！玩家已恢复九叶灵芝本体！"
        } else {
            ""
        },
    );

    if let Some(c) = focused {
        let first_key = c.stat_metas.first().map(|m| m.key).unwrap_or_default();
        let primary = state
            .character_stats
            .get(c.id)
            .and_then(|s| s.get(first_key))
            .copied()
            .unwrap_or(0);
        let level = data::stat_level(primary);
        prompt.push_str(&format!(
            "\n\n## 当前互动角色\n\
             {}（{}，{}岁）\n\
             性格：{}\n\
             说话风格：{}\n\
             行为模式：{}\n\
             触发点：{}\n\
             当前关系：{}（{}）",
            c.name,
            c.title,
            c.age,
            c.personality,
            c.speaking_style,
            c.behavior_patterns,
            c.trigger_points.join("；"),
            level.name,
            stat_summary(state, c),
        ));
    }

    let inventory = {
        let mut owned: Vec<_> = state
            .inventory
            .iter()
            .filter(|(_, n)| **n > 0)
            .filter_map(|(id, n)| {
                ITEMS
                    .get(id.as_str())
                    .map(|item| (item.id, format!("{} {} x{}", item.icon, item.name, n)))
            })
            .collect();
        owned.sort_by_key(|(id, _)| *id);
        let listed: Vec<_> = owned.into_iter().map(|(_, line)| line).collect();
        if listed.is_empty() {
            "空".to_string()
        } else {
            listed.join("、")
        }
    };

    prompt.push_str(&format!(
        "\n\n## 所有角色当前数值\n{all_stats}\n\n\
         ## 背包\n{inventory}\n\n\
         ## 已触发事件\n{events}\n\n\
         ## 历史摘要\n{summary}",
        events = if state.triggered_events.is_empty() {
            "无".to_string()
        } else {
            state.triggered_events.join("、")
        },
        summary = if state.history_summary.is_empty() {
            "旅程刚刚开始"
        } else {
            &state.history_summary
        },
    ));

    prompt
}

/// The recent raw-history window: kind-tagged banners are excluded, and only
/// the last [`RECENT_WINDOW`] entries are kept.
fn recent_window(state: &GameState) -> Vec<ChatMessage> {
    let plain: Vec<&_> = state.messages.iter().filter(|m| m.kind.is_none()).collect();
    let start = plain.len().saturating_sub(RECENT_WINDOW);
    plain[start..]
        .iter()
        .map(|m| match m.role {
            MessageRole::User => ChatMessage::user(&m.content),
            MessageRole::Assistant => ChatMessage::assistant(&m.content),
            MessageRole::System => ChatMessage::system(&m.content),
        })
        .collect()
}

/// Assemble the complete message list for one narration call.
pub fn build(state: &GameState) -> Vec<ChatMessage> {
    let focused = state.focused_character();
    let mut messages = vec![ChatMessage::system(build_system_prompt(state, focused))];
    if !state.history_summary.is_empty() {
        messages.push(ChatMessage::system(format!(
            "[历史摘要] {}",
            state.history_summary
        )));
    }
    messages.extend(recent_window(state));
    messages
}

/// Whether the message log has grown past the compression threshold without
/// a summary in place yet.
pub fn needs_compression(state: &GameState) -> bool {
    state.messages.len() > HISTORY_COMPRESS_THRESHOLD && state.history_summary.is_empty()
}

/// The one-shot summarization request over everything outside the recent
/// window. `None` when there is nothing worth compressing.
pub fn compression_request(state: &GameState) -> Option<String> {
    let cutoff = state.messages.len().saturating_sub(RECENT_WINDOW);
    let old_text = state.messages[..cutoff]
        .iter()
        .filter(|m| m.kind.is_none())
        .map(|m| {
            let role = match m.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System => "system",
            };
            let content: String = m.content.chars().take(200).collect();
            format!("[{role}]: {content}")
        })
        .collect::<Vec<_>>()
        .join("\n");

    if old_text.is_empty() {
        return None;
    }
    Some(format!(
        "请用200字以内概括以下仙侠游戏的对话历史，保留关键剧情、角色互动和数值变化：\n\n{old_text}"
    ))
}
