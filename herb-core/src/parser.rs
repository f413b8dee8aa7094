//! Narrative text parsing.
//!
//! Model output is newline-separated prose mixed with bracketed markers:
//! `【叶青霜】好感+10` (tagged delta), `【好感度+10 信任度-5】` (pure stat
//! line), `【获得 化形池线索碎片】` (item gain), `【角色名】（动作）"台词"`
//! (attributed dialogue), and a trailing numbered choice list. The parser is
//! lenient: markers that resolve against the roster become structured data,
//! everything unrecognizable stays narrative prose. All raw text is escaped
//! before it is embedded in rendered markup.

use crate::data::Character;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    /// Bracket group anywhere in a line: `【...】` or `[...]`.
    static ref BRACKET_RE: Regex = Regex::new(r"[【\[]([^】\]]+)[】\]]").unwrap();
    /// Tagged delta with the label outside the bracket: `【叶青霜】好感+10`.
    static ref TAGGED_DELTA_RE: Regex =
        Regex::new(r"[【\[]([^】\]]+)[】\]]\s*([^\s【\[】\]+\-]+)([+-])(\d+)").unwrap();
    /// A `label+N` token inside bracket content.
    static ref TOKEN_DELTA_RE: Regex =
        Regex::new(r"^([^\s【\[】\]+\-]+)([+-])(\d+)$").unwrap();
    /// Leading bracket whose content carries a signed number.
    static ref STAT_BRACKET_RE: Regex =
        Regex::new(r"^[【\[][^】\]]*[+-]\d+[^】\]]*[】\]]").unwrap();
    /// Signed magnitudes inside stat lines, for display emphasis.
    static ref STAT_UP_RE: Regex = Regex::new(r"\+\d+[万%]?").unwrap();
    static ref STAT_DOWN_RE: Regex = Regex::new(r"-\d+[万%]?").unwrap();
    /// Numbered and lettered choice lines.
    static ref NUM_CHOICE_RE: Regex = Regex::new(r"^[1-4][.、．]\s*.+").unwrap();
    static ref ALPHA_CHOICE_RE: Regex = Regex::new(r"^[A-Da-d][.、．]\s*.+").unwrap();
    static ref CHOICE_PREFIX_RE: Regex = Regex::new(r"^[1-4A-Da-d][.、．]\s*").unwrap();
    static ref CHOICE_HEADER_RE: Regex =
        Regex::new(r"选择|选项|你可以|接下来|你的行动").unwrap();
    /// Inline spans within narrative prose.
    static ref INLINE_RE: Regex =
        Regex::new(r#"（[^（）\n]*）|\([^()\n]*\)|\*[^*\n]+\*|"[^"\n]*"|“[^”\n]*”"#).unwrap();
}

/// One extracted stat change, resolved against the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatDelta {
    pub char_id: String,
    pub stat_key: String,
    pub delta: i32,
}

/// The structured result of parsing one complete model response.
#[derive(Debug, Clone, Default)]
pub struct ParsedTurn {
    /// Narrative prose with stat markers stripped, rendered as escaped markup.
    pub narrative_html: String,
    /// Stat-change and item-gain lines rendered as a separate block.
    pub stat_html: String,
    pub stat_deltas: Vec<StatDelta>,
    /// First attributed character, by bracket tag or name mention.
    pub speaker_id: Option<String>,
}

/// Result of splitting a response into narrative and player choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedChoices {
    pub clean_text: String,
    pub choices: Vec<String>,
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Global label → (character, stat key) table, flattened from the roster's
/// StatMeta lists with the `度`/`值` suffix variants the model produces.
/// Characters are visited in id order so collisions resolve deterministically
/// (first character in id order wins a shared label).
fn build_label_table(characters: &HashMap<String, Character>) -> HashMap<String, (String, String)> {
    let mut ids: Vec<_> = characters.keys().collect();
    ids.sort();

    let mut table = HashMap::new();
    for id in ids {
        let c = &characters[id];
        for meta in c.stat_metas {
            for label in [
                meta.label.to_string(),
                format!("{}度", meta.label),
                format!("{}值", meta.label),
            ] {
                table
                    .entry(label)
                    .or_insert_with(|| (id.clone(), meta.key.to_string()));
            }
        }
    }
    table
}

fn find_by_name<'a>(
    characters: &'a HashMap<String, Character>,
    name: &str,
) -> Option<&'a Character> {
    characters.values().find(|c| c.name == name)
}

/// Extract every stat delta in `content`.
///
/// Two forms are recognized. Form A keeps the label outside the bracket
/// (`【叶青霜】好感+10`); form B carries name and delta together inside one
/// bracket (`【叶青霜 好感+10】` or `【好感度+10 信任度-5】`). In both, a
/// bracket naming a character scopes label resolution to that character's
/// own StatMeta; anything else falls back to the global label table.
/// Unresolvable labels are dropped.
pub fn stat_changes(
    content: &str,
    characters: &HashMap<String, Character>,
) -> Vec<StatDelta> {
    let label_table = build_label_table(characters);
    let mut deltas = Vec::new();

    // Form B: delta tokens inside the bracket.
    for cap in BRACKET_RE.captures_iter(content) {
        let inner = &cap[1];
        let mut tokens = inner.split_whitespace();
        let first = tokens.next().unwrap_or("");
        let scope = find_by_name(characters, first);

        let token_stream: Vec<&str> = if scope.is_some() {
            tokens.collect()
        } else {
            inner.split_whitespace().collect()
        };

        for token in token_stream {
            let Some(tc) = TOKEN_DELTA_RE.captures(token) else {
                continue;
            };
            let label = &tc[1];
            let magnitude: i32 = tc[3].parse().unwrap_or(0);
            let delta = if &tc[2] == "+" { magnitude } else { -magnitude };

            let resolved = match scope {
                Some(c) => c
                    .stat_meta_for_label(label)
                    .map(|m| (c.id.to_string(), m.key.to_string())),
                None => label_table.get(label).cloned(),
            };
            if let Some((char_id, stat_key)) = resolved {
                deltas.push(StatDelta { char_id, stat_key, delta });
            }
        }
    }

    // Form A: label after the bracket.
    for cap in TAGGED_DELTA_RE.captures_iter(content) {
        let label = &cap[2];
        let magnitude: i32 = cap[4].parse().unwrap_or(0);
        let delta = if &cap[3] == "+" { magnitude } else { -magnitude };

        let resolved = match find_by_name(characters, &cap[1]) {
            Some(c) => c
                .stat_meta_for_label(label)
                .map(|m| (c.id.to_string(), m.key.to_string())),
            None => label_table.get(label).cloned(),
        };
        if let Some((char_id, stat_key)) = resolved {
            deltas.push(StatDelta { char_id, stat_key, delta });
        }
    }

    deltas
}

/// Escape a narrative line and wrap its inline spans: parenthesized and
/// asterisk-wrapped runs become action spans, double-quoted runs (straight or
/// curly) become dialogue spans.
fn render_inline(line: &str) -> String {
    let mut html = String::new();
    let mut last = 0;

    for m in INLINE_RE.find_iter(line) {
        html.push_str(&escape_html(&line[last..m.start()]));
        let span = m.as_str();
        if span.starts_with('*') {
            let inner = span.trim_matches('*');
            html.push_str(&format!(
                "<span class=\"action\">{}</span>",
                escape_html(inner)
            ));
        } else if span.starts_with('（') || span.starts_with('(') {
            html.push_str(&format!(
                "<span class=\"action\">{}</span>",
                escape_html(span)
            ));
        } else {
            html.push_str(&format!(
                "<span class=\"dialogue\">{}</span>",
                escape_html(span)
            ));
        }
        last = m.end();
    }
    html.push_str(&escape_html(&line[last..]));
    html
}

/// Emphasize stat labels, character names and signed magnitudes in a stat
/// line. Colors come from the roster's StatMeta, not a hardcoded table. All
/// labels are matched in one pass, longest first, so `好感度` never ends up
/// with a nested span around its `好感` prefix.
fn colorize_stat_line(line: &str, characters: &HashMap<String, Character>) -> String {
    let mut html = escape_html(line);

    let mut ids: Vec<_> = characters.keys().collect();
    ids.sort();

    let mut label_colors: HashMap<String, &str> = HashMap::new();
    for id in &ids {
        for meta in characters[*id].stat_metas {
            for label in [
                format!("{}度", meta.label),
                format!("{}值", meta.label),
                meta.label.to_string(),
            ] {
                label_colors.entry(label).or_insert(meta.color);
            }
        }
    }
    if !label_colors.is_empty() {
        let mut alts: Vec<String> = label_colors.keys().map(|l| regex::escape(l)).collect();
        alts.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        if let Ok(re) = Regex::new(&alts.join("|")) {
            html = re
                .replace_all(&html, |caps: &regex::Captures| {
                    let label = &caps[0];
                    format!(
                        "<span class=\"stat-change\" style=\"color:{}\">{label}</span>",
                        label_colors[label]
                    )
                })
                .into_owned();
        }
    }

    for id in &ids {
        let name = characters[*id].name;
        html = html.replace(name, &format!("<span class=\"char-name\">{name}</span>"));
    }

    html = STAT_UP_RE
        .replace_all(&html, "<span class=\"stat-up\">$0</span>")
        .into_owned();
    html = STAT_DOWN_RE
        .replace_all(&html, "<span class=\"stat-down\">$0</span>")
        .into_owned();
    html
}

/// Parse one complete model response into renderable narrative, a stat-change
/// block, the extracted deltas, and the detected speaker.
pub fn parse(content: &str, characters: &HashMap<String, Character>) -> ParsedTurn {
    let stat_deltas = stat_changes(content, characters);

    let mut narrative_lines: Vec<String> = Vec::new();
    let mut stat_parts: Vec<String> = Vec::new();
    let mut speaker_id: Option<String> = None;

    for raw in content.split('\n') {
        let line = raw.trim();

        if line.is_empty() {
            narrative_lines.push(String::new());
            continue;
        }

        // Bracket carrying a signed number: a stat marker, not dialogue.
        // Any prose after the bracket stays narrative.
        if let Some(m) = STAT_BRACKET_RE.find(line) {
            stat_parts.push(colorize_stat_line(m.as_str(), characters));
            let rest = line[m.end()..].trim();
            if !rest.is_empty() {
                narrative_lines.push(rest.to_string());
            }
            continue;
        }

        if line.starts_with("【获得") || line.starts_with("[获得") {
            stat_parts.push(format!(
                "<div class=\"item-gain\">{}</div>",
                escape_html(line)
            ));
            continue;
        }

        if speaker_id.is_none() {
            if let Some(cap) = BRACKET_RE.captures(line) {
                if cap.get(0).map(|m| m.start()) == Some(0) {
                    speaker_id = find_by_name(characters, &cap[1]).map(|c| c.id.to_string());
                }
            }
        }

        narrative_lines.push(raw.to_string());
    }

    // Fallback: earliest name mention anywhere in the content.
    if speaker_id.is_none() {
        speaker_id = characters
            .values()
            .filter_map(|c| content.find(c.name).map(|pos| (pos, c.id)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, id)| id.to_string());
    }

    // Paragraphs split on blank lines, line breaks kept within a paragraph.
    let joined = narrative_lines.join("\n");
    let narrative_html = joined
        .trim()
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| {
            let body = p
                .trim()
                .lines()
                .map(render_inline)
                .collect::<Vec<_>>()
                .join("<br>");
            format!("<p>{body}</p>")
        })
        .collect::<Vec<_>>()
        .join("");

    let stat_html = if stat_parts.is_empty() {
        String::new()
    } else {
        format!("<div class=\"stat-changes\">{}</div>", stat_parts.join(""))
    };

    ParsedTurn {
        narrative_html,
        stat_html,
        stat_deltas,
        speaker_id,
    }
}

/// Split trailing numbered choice lines off a response.
///
/// Scans from the end collecting consecutive `1.`/`A、`-style lines (blank
/// lines are skipped, a non-matching line breaks the run). Fewer than two
/// matches means no extraction: ordinary numbered prose is left alone. On
/// success, one preceding header line with an options cue phrase, and the
/// blank line before it, are also removed from the clean text.
pub fn extract_choices(content: &str) -> ExtractedChoices {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut choices: Vec<String> = Vec::new();
    let mut choice_start = lines.len();

    for i in (0..lines.len()).rev() {
        let trimmed = lines[i].trim();
        if trimmed.is_empty() {
            continue;
        }
        if NUM_CHOICE_RE.is_match(trimmed) || ALPHA_CHOICE_RE.is_match(trimmed) {
            choices.insert(0, CHOICE_PREFIX_RE.replace(trimmed, "").into_owned());
            choice_start = i;
        } else {
            break;
        }
    }

    if choices.len() < 2 {
        return ExtractedChoices {
            clean_text: content.to_string(),
            choices: Vec::new(),
        };
    }

    let mut cut = choice_start;
    if cut > 0 && CHOICE_HEADER_RE.is_match(lines[cut - 1].trim()) {
        cut -= 1;
    }
    if cut > 0 && lines[cut - 1].trim().is_empty() {
        cut -= 1;
    }

    ExtractedChoices {
        clean_text: lines[..cut].join("\n").trim().to_string(),
        choices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{build_characters, Gender};

    fn roster() -> HashMap<String, Character> {
        build_characters(Gender::Male)
    }

    #[test]
    fn test_tagged_delta_outside_bracket() {
        let deltas = stat_changes("【叶青霜】好感+10", &roster());
        assert_eq!(
            deltas,
            vec![StatDelta {
                char_id: "yeqingshuang".into(),
                stat_key: "affection".into(),
                delta: 10,
            }]
        );
    }

    #[test]
    fn test_inline_delta_with_trailing_prose() {
        let parsed = parse("【叶青霜 好感+10】你好", &roster());
        assert_eq!(
            parsed.stat_deltas,
            vec![StatDelta {
                char_id: "yeqingshuang".into(),
                stat_key: "affection".into(),
                delta: 10,
            }]
        );
        assert_eq!(parsed.narrative_html, "<p>你好</p>");
    }

    #[test]
    fn test_character_scoped_resolution_beats_shared_label() {
        // Both 叶青霜 and 赤璃 expose 好感; the bracket name scopes it.
        let deltas = stat_changes("【赤璃】好感+5", &roster());
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].char_id, "chili");
        assert_eq!(deltas[0].stat_key, "affection");
    }

    #[test]
    fn test_global_fallback_without_character_name() {
        let deltas = stat_changes("【信任度+5】", &roster());
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].char_id, "yeqingshuang");
        assert_eq!(deltas[0].stat_key, "trust");
        assert_eq!(deltas[0].delta, 5);
    }

    #[test]
    fn test_pure_stat_line_with_multiple_tokens() {
        let deltas = stat_changes("【好感+10 同化-5】", &roster());
        assert_eq!(deltas.len(), 2);
        // 好感 is shared; first character in id order (chili) wins the
        // global table.
        assert_eq!(deltas[0].char_id, "chili");
        assert_eq!(deltas[0].delta, 10);
        assert_eq!(deltas[1].char_id, "chili");
        assert_eq!(deltas[1].stat_key, "assimilation");
        assert_eq!(deltas[1].delta, -5);
    }

    #[test]
    fn test_negative_delta_and_suffix_variants() {
        let deltas = stat_changes("【丹辰子】觊觎度-10", &roster());
        assert_eq!(
            deltas,
            vec![StatDelta {
                char_id: "danchenzi".into(),
                stat_key: "coveting".into(),
                delta: -10,
            }]
        );
    }

    #[test]
    fn test_unresolvable_labels_dropped() {
        assert!(stat_changes("【叶青霜】戾气+10", &roster()).is_empty());
        assert!(stat_changes("【莫名其妙+3】", &roster()).is_empty());
    }

    #[test]
    fn test_speaker_from_bracket_tag() {
        let parsed = parse("【赤璃】（慵懒地靠在树上）\"哟，小灵芝。\"", &roster());
        assert_eq!(parsed.speaker_id.as_deref(), Some("chili"));
    }

    #[test]
    fn test_speaker_fallback_earliest_mention() {
        let parsed = parse("远处，丹辰子的弟子正在搜山，叶青霜按剑而立。", &roster());
        assert_eq!(parsed.speaker_id.as_deref(), Some("danchenzi"));
    }

    #[test]
    fn test_no_speaker_detected() {
        let parsed = parse("山风穿过洞口，带来草木的清香。", &roster());
        assert_eq!(parsed.speaker_id, None);
    }

    #[test]
    fn test_stat_lines_excluded_from_narrative() {
        let parsed = parse("你递过灵果。\n【好感度+10】\n她接了过去。", &roster());
        assert!(!parsed.narrative_html.contains("好感度"));
        assert!(parsed.stat_html.contains("stat-changes"));
        assert!(parsed.stat_html.contains("stat-up"));
    }

    #[test]
    fn test_item_gain_block() {
        let parsed = parse("【获得 化形池线索碎片 x1】", &roster());
        assert!(parsed.stat_html.contains("item-gain"));
        assert!(parsed.narrative_html.is_empty());
    }

    #[test]
    fn test_html_escaping() {
        let parsed = parse("他说 <script>alert(1)</script> & \"行\"", &roster());
        assert!(!parsed.narrative_html.contains("<script>"));
        assert!(parsed.narrative_html.contains("&lt;script&gt;"));
        assert!(parsed.narrative_html.contains("&amp;"));
    }

    #[test]
    fn test_inline_spans() {
        let parsed = parse("她（低头看剑）说：\"走吧。\" *转身离去*", &roster());
        assert!(parsed
            .narrative_html
            .contains("<span class=\"action\">（低头看剑）</span>"));
        assert!(parsed
            .narrative_html
            .contains("<span class=\"dialogue\">&quot;走吧。&quot;</span>"));
        assert!(parsed
            .narrative_html
            .contains("<span class=\"action\">转身离去</span>"));
    }

    #[test]
    fn test_extract_choices_three_lines_with_header() {
        let text = "叶青霜收剑入鞘。\n\n你的选择：\n1. 上前道谢\n2、询问她的来历\n3．转身离开";
        let out = extract_choices(text);
        assert_eq!(out.choices, vec!["上前道谢", "询问她的来历", "转身离开"]);
        assert_eq!(out.clean_text, "叶青霜收剑入鞘。");
    }

    #[test]
    fn test_extract_choices_lettered() {
        let text = "怎么办？\nA. 躲起来\nB、冲出去";
        let out = extract_choices(text);
        assert_eq!(out.choices, vec!["躲起来", "冲出去"]);
        assert_eq!(out.clean_text, "怎么办？");
    }

    #[test]
    fn test_single_numbered_line_is_not_a_choice() {
        let text = "她说了三件事。\n1. 化形池在万妖森林深处";
        let out = extract_choices(text);
        assert!(out.choices.is_empty());
        assert_eq!(out.clean_text, text);
    }

    #[test]
    fn test_extract_choices_idempotent() {
        let text = "剧情推进。\n\n选项：\n1. 甲\n2. 乙\n3. 丙";
        let first = extract_choices(text);
        let second = extract_choices(&first.clean_text);
        assert!(second.choices.is_empty());
        assert_eq!(second.clean_text, first.clean_text);
    }

    #[test]
    fn test_blank_lines_between_choices_skipped() {
        let text = "正文。\n1. 甲\n\n2. 乙";
        let out = extract_choices(text);
        assert_eq!(out.choices, vec!["甲", "乙"]);
    }
}
