//! Static reference data for the Spirit Herb Chronicle.
//!
//! Characters, scenes, items, chapters, forced events, endings and time
//! periods, all keyed by id. The tables here are the single source of truth:
//! no other module may hardcode a character's stat set; stat axes are
//! declared in each character's [`StatMeta`] list and everything else
//! (parsing, prompts, drift) is driven from that.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Total length of a playthrough in days.
pub const MAX_DAYS: u32 = 30;

/// Action points restored at the start of each day.
pub const MAX_ACTION_POINTS: u32 = 6;

/// Days until the first new-moon night.
pub const NEW_MOON_COUNTDOWN: u32 = 15;

/// Scenes unlocked from the very first day.
pub const STARTING_SCENES: [&str; 2] = ["cave", "outskirts"];

/// Starting inventory: (item id, count).
pub const STARTING_INVENTORY: [(&str, u32); 1] = [("concealment-talisman", 3)];

// ============================================================================
// Types
// ============================================================================

/// Declarative descriptor of one numeric relationship/reputation axis.
///
/// `auto_increment` / `decay_rate` describe per-day drift applied when time
/// wraps into a new day.
#[derive(Debug, Clone)]
pub struct StatMeta {
    pub key: &'static str,
    pub label: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
    pub auto_increment: Option<i32>,
    pub decay_rate: Option<i32>,
}

/// A character's current stat values, keyed by [`StatMeta::key`].
pub type CharacterStats = HashMap<String, i32>;

/// Player (and NPC) gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// An NPC in the roster.
///
/// The roster is built at game start because one character's gender
/// complements the player's; see [`build_characters`].
#[derive(Debug, Clone)]
pub struct Character {
    pub id: &'static str,
    pub name: &'static str,
    pub avatar: &'static str,
    pub gender: Gender,
    pub age: u32,
    pub title: &'static str,
    pub description: &'static str,
    pub personality: &'static str,
    pub speaking_style: &'static str,
    pub secret: &'static str,
    pub trigger_points: &'static [&'static str],
    pub behavior_patterns: &'static str,
    pub theme_color: &'static str,
    /// The character is invisible to prompts and stat summaries before this day.
    pub join_day: u32,
    pub stat_metas: &'static [StatMeta],
    pub initial_stats: &'static [(&'static str, i32)],
}

impl Character {
    /// Look up a stat descriptor by exact label or the `度`/`值` suffix
    /// variants the model tends to produce.
    pub fn stat_meta_for_label(&self, label: &str) -> Option<&StatMeta> {
        self.stat_metas.iter().find(|m| {
            label == m.label
                || label == format!("{}度", m.label)
                || label == format!("{}值", m.label)
        })
    }
}

/// Requirement on one character's stat.
#[derive(Debug, Clone)]
pub struct StatRequirement {
    pub char_id: &'static str,
    pub key: &'static str,
    pub min: i32,
}

/// A scene's unlock condition. Both halves must hold when present.
#[derive(Debug, Clone, Default)]
pub struct UnlockCondition {
    pub event: Option<&'static str>,
    pub stat: Option<StatRequirement>,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub atmosphere: &'static str,
    pub tags: &'static [&'static str],
    pub unlock_condition: Option<UnlockCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Consumable,
    Collectible,
    Quest,
}

#[derive(Debug, Clone)]
pub struct GameItem {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub item_type: ItemType,
    pub description: &'static str,
    pub max_count: u32,
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub id: u32,
    pub name: &'static str,
    /// Inclusive day range. Chapter ranges partition 1..=MAX_DAYS.
    pub day_range: (u32, u32),
    pub description: &'static str,
    pub objectives: &'static [&'static str],
    pub atmosphere: &'static str,
}

/// A one-time story beat gated by day (and optionally time period).
#[derive(Debug, Clone)]
pub struct ForcedEvent {
    pub id: &'static str,
    pub name: &'static str,
    pub trigger_day: u32,
    pub trigger_period: Option<usize>,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndingType {
    /// True ending.
    TE,
    /// Happy ending.
    HE,
    /// Bad ending.
    BE,
    /// Normal ending.
    NE,
}

#[derive(Debug, Clone)]
pub struct Ending {
    pub id: &'static str,
    pub name: &'static str,
    pub ending_type: EndingType,
    pub description: &'static str,
    pub condition: &'static str,
}

#[derive(Debug, Clone)]
pub struct TimePeriod {
    pub index: usize,
    pub name: &'static str,
    pub icon: &'static str,
    pub hours: &'static str,
}

/// Opening framing shown to the player and fed to the prompt builder.
pub struct StoryInfo {
    pub genre: &'static str,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub description: &'static str,
    pub goals: &'static [&'static str],
}

// ============================================================================
// Time periods
// ============================================================================

pub static PERIODS: [TimePeriod; 6] = [
    TimePeriod { index: 0, name: "清晨", icon: "🌅", hours: "05:00-08:59" },
    TimePeriod { index: 1, name: "上午", icon: "☀️", hours: "09:00-11:59" },
    TimePeriod { index: 2, name: "中午", icon: "🌞", hours: "12:00-13:59" },
    TimePeriod { index: 3, name: "下午", icon: "⛅", hours: "14:00-16:59" },
    TimePeriod { index: 4, name: "傍晚", icon: "🌇", hours: "17:00-19:59" },
    TimePeriod { index: 5, name: "深夜", icon: "🌙", hours: "20:00-04:59" },
];

/// Index of the night period, when new-moon exposure happens.
pub const NIGHT_PERIOD: usize = 5;

// ============================================================================
// Characters
// ============================================================================

static DANCHENZI_METAS: [StatMeta; 1] = [StatMeta {
    key: "coveting",
    label: "觊觎",
    color: "#b45309",
    icon: "👁",
    auto_increment: Some(5),
    decay_rate: None,
}];

static YEQINGSHUANG_METAS: [StatMeta; 2] = [
    StatMeta {
        key: "affection",
        label: "好感",
        color: "#ef4444",
        icon: "❤",
        auto_increment: None,
        decay_rate: None,
    },
    StatMeta {
        key: "trust",
        label: "信任",
        color: "#22c55e",
        icon: "🤝",
        auto_increment: None,
        decay_rate: None,
    },
];

static CHILI_METAS: [StatMeta; 2] = [
    StatMeta {
        key: "affection",
        label: "好感",
        color: "#ef4444",
        icon: "❤",
        auto_increment: None,
        decay_rate: None,
    },
    StatMeta {
        key: "assimilation",
        label: "同化",
        color: "#7c3aed",
        icon: "🔮",
        auto_increment: None,
        decay_rate: None,
    },
];

/// 丹辰子，药王谷谷主。固定男性，一维数值：觊觎。
fn danchenzi() -> Character {
    Character {
        id: "danchenzi",
        name: "丹辰子",
        avatar: "丹",
        gender: Gender::Male,
        age: 800,
        title: "药王谷谷主",
        description: "仙风道骨的正道宗主，被誉为\"丹道第一人\"。表面温和慈祥，实则心狠手辣——他也是灵草成精，需吞噬同类维持人形。",
        personality: "道貌岸然 | 贪婪偏执 + 虚伪阴险 + 不怒自威",
        speaking_style: "温文尔雅，喜用典故和比喻，长句为主，排比反问，嘴角挂着从不达眼底的笑意",
        secret: "曾经也是灵草成精，通过吞噬其他灵草维持人形，朔月之夜也会短暂恢复本体",
        trigger_points: &["在他面前提\"灵草\"、\"化形\"", "试图揭穿他的真实身份", "拒绝他的\"好意\""],
        behavior_patterns: "觊觎度<60表面温和暗中观察，60-80派人接触试探，>80不择手段直接抓捕",
        theme_color: "#b45309",
        join_day: 1,
        stat_metas: &DANCHENZI_METAS,
        initial_stats: &[("coveting", 50)],
    }
}

/// 叶青霜，散修剑修。性别与玩家互补。
fn yeqingshuang(player_gender: Gender) -> Character {
    let is_female = player_gender == Gender::Male;
    Character {
        id: "yeqingshuang",
        name: "叶青霜",
        avatar: "叶",
        gender: if is_female { Gender::Female } else { Gender::Male },
        age: 300,
        title: "散修剑修",
        description: if is_female {
            "清冷如霜的女剑修，如同一柄出鞘的利剑。百年前的\"七叶雪莲\"成精，已成功化形。看到你就像看到当年的自己。"
        } else {
            "冷峻如冰的男剑修，如同一柄藏于鞘中的名剑。百年前的\"七叶雪莲\"成精，已成功化形。看到你就像看到当年的自己。"
        },
        personality: "外冷内热 | 隐忍守护 + 孤独三百年 + 同类保护欲",
        speaking_style: "简洁直接，短句为主，命令句多，偶尔流露的温柔让人心疼",
        secret: "百年前的\"七叶雪莲\"成精，已成功化形。知道化形池真相、丹辰子真实身份、朔月之夜的真正意义",
        trigger_points: &["提及\"丹辰子\"或\"药王谷\"", "伤害其他灵草成精者", "不真诚"],
        behavior_patterns: "好感<30冷漠只提供基本帮助，30-60友好主动提供情报，>60透露自己秘密",
        theme_color: "#0ea5e9",
        join_day: 1,
        stat_metas: &YEQINGSHUANG_METAS,
        initial_stats: &[("affection", 0), ("trust", 0)],
    }
}

/// 赤璃，妖族少主。固定男性。
fn chili() -> Character {
    Character {
        id: "chili",
        name: "赤璃",
        avatar: "赤",
        gender: Gender::Male,
        age: 200,
        title: "妖族少主",
        description: "邪魅狂狷的妖族少主，半妖半人的混血。琥珀色瞳孔在暗处发光，额头有妖族王室红纹。真心想帮你，代价是成为妖族一员。",
        personality: "热情偏执 | 孤独半妖 + 真诚但偏执 + 认为妖族才是灵物归宿",
        speaking_style: "慵懒散漫，长短句结合，感叹句多，偶尔认真时眼神锐利如野兽",
        secret: "半妖半人的混血，在两边都不被接纳。知道化形池真相但认为成为妖比做人更好",
        trigger_points: &["提及\"人\"或\"人类\"", "伤害妖族", "否定妖族的生活方式"],
        behavior_patterns: "好感<30感兴趣保持距离，30-60友好主动帮助，>60透露妖族秘密",
        theme_color: "#ef4444",
        join_day: 1,
        stat_metas: &CHILI_METAS,
        initial_stats: &[("affection", 0), ("assimilation", 0)],
    }
}

/// Build the character roster for a playthrough.
pub fn build_characters(player_gender: Gender) -> HashMap<String, Character> {
    [danchenzi(), yeqingshuang(player_gender), chili()]
        .into_iter()
        .map(|c| (c.id.to_string(), c))
        .collect()
}

/// Initial stat values for every roster member.
pub fn build_initial_stats(characters: &HashMap<String, Character>) -> HashMap<String, CharacterStats> {
    characters
        .iter()
        .map(|(id, c)| {
            let stats = c
                .initial_stats
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect();
            (id.clone(), stats)
        })
        .collect()
}

// ============================================================================
// Scenes, items, chapters, events, endings
// ============================================================================

lazy_static! {
    pub static ref SCENES: HashMap<&'static str, Scene> = {
        let scenes = [
            Scene {
                id: "cave",
                name: "隐秘山洞",
                icon: "🕳️",
                description: "落霞山脉深处的天然山洞，洞顶裂缝透进微弱光线，空气中弥漫着潮湿的土腥味和你自己的药香。",
                atmosphere: "安静、隐秘、安全",
                tags: &["藏身处", "初始", "探索"],
                unlock_condition: None,
            },
            Scene {
                id: "outskirts",
                name: "落霞山脉",
                icon: "⛰️",
                description: "茂密的山林，树木高大遮天蔽日。阳光透过树叶洒下斑驳光影，远处偶有野兽咆哮。自由但危险。",
                atmosphere: "自由、危险、机遇并存",
                tags: &["野外", "初始", "采集"],
                unlock_condition: None,
            },
            Scene {
                id: "tianjicheng",
                name: "天机城",
                icon: "🏯",
                description: "修仙界的交易中心，街道宽阔建筑林立。各种丹药法宝灵草在此交易，鱼龙混杂，消息灵通。",
                atmosphere: "繁华、热闹、鱼龙混杂",
                tags: &["城市", "交易", "情报"],
                unlock_condition: Some(UnlockCondition {
                    event: Some("meet-yeqingshuang"),
                    stat: None,
                }),
            },
            Scene {
                id: "yaowanggu",
                name: "药王谷",
                icon: "⚗️",
                description: "宏伟的山谷中布满药田和炼丹房，常年阳光照耀，浓郁药香混杂炼丹气息。正道圣地，也是你的噩梦之地。",
                atmosphere: "庄严、危险、诱惑",
                tags: &["宗门", "危险", "情报"],
                unlock_condition: Some(UnlockCondition {
                    event: Some("danchenzi-invitation"),
                    stat: Some(StatRequirement {
                        char_id: "danchenzi",
                        key: "coveting",
                        min: 80,
                    }),
                }),
            },
            Scene {
                id: "forest",
                name: "万妖森林",
                icon: "🌲",
                description: "茂密的原始森林，阳光几乎无法穿透厚厚树冠。发光的蘑菇点缀深绿，远处传来妖族祭祀歌声。",
                atmosphere: "神秘、危险、诱惑",
                tags: &["妖界", "化形池", "秘境"],
                unlock_condition: Some(UnlockCondition {
                    event: Some("chili-proposal"),
                    stat: None,
                }),
            },
        ];
        scenes.into_iter().map(|s| (s.id, s)).collect()
    };

    pub static ref ITEMS: HashMap<&'static str, GameItem> = {
        let items = [
            GameItem {
                id: "concealment-talisman",
                name: "隐匿符",
                icon: "📜",
                item_type: ItemType::Consumable,
                description: "黄色符纸，复杂符文。点燃后化作青烟笼罩全身，暂时掩盖本体气息。",
                max_count: 6,
            },
            GameItem {
                id: "pool-fragment",
                name: "化形池线索碎片",
                icon: "🔮",
                item_type: ItemType::Collectible,
                description: "古老的玉片，上面刻着模糊文字。集齐3片可得知化形池位置。",
                max_count: 3,
            },
            GameItem {
                id: "elder-diary",
                name: "灵草前辈日记",
                icon: "📖",
                item_type: ItemType::Quest,
                description: "封面写着\"灵草札记\"的古老书册，记载着前辈灵草的经验和对化形池的警告。",
                max_count: 1,
            },
        ];
        items.into_iter().map(|i| (i.id, i)).collect()
    };

    pub static ref CHAPTERS: Vec<Chapter> = vec![
        Chapter {
            id: 1,
            name: "初化人形",
            day_range: (1, 5),
            description: "你刚刚化形成功，对外界一无所知。必须在被发现之前学会生存。",
            objectives: &["在落霞山脉生存下来", "学会使用隐匿符", "不被丹辰子的追兵发现"],
            atmosphere: "紧张中带着好奇",
        },
        Chapter {
            id: 2,
            name: "三方博弈",
            day_range: (6, 15),
            description: "丹辰子、叶青霜、赤璃三方势力相继出现，你必须在他们之间周旋。",
            objectives: &["在朔月之夜到来前找到庇护所", "从各方获取化形池线索", "理清三方真实目的"],
            atmosphere: "紧张、纠结",
        },
        Chapter {
            id: 3,
            name: "朔月之夜",
            day_range: (16, 16),
            description: "朔月之夜到来，你会短暂恢复九叶灵芝本体形态。最危险的时刻。",
            objectives: &["在朔月之夜存活", "不被任何人发现本体", "借朔月感知化形池方位"],
            atmosphere: "紧张、绝望、希望",
        },
        Chapter {
            id: 4,
            name: "化形之路",
            day_range: (17, 30),
            description: "你终于得知化形池的位置，但必须付出巨大代价才能到达。最终抉择在前方等待。",
            objectives: &["到达化形池", "做出最终选择", "面对化形池的真相"],
            atmosphere: "悲壮、希望",
        },
    ];

    pub static ref FORCED_EVENTS: Vec<ForcedEvent> = vec![
        ForcedEvent {
            id: "meet-yeqingshuang",
            name: "初遇叶青霜",
            trigger_day: 3,
            trigger_period: Some(1),
            description: "落霞山脉外围，叶青霜正与丹辰子的弟子战斗。你可以选择帮助或趁机逃走。",
        },
        ForcedEvent {
            id: "danchenzi-invitation",
            name: "丹辰子的邀请",
            trigger_day: 8,
            trigger_period: None,
            description: "丹辰子派人送来请帖，\"邀请\"你前往药王谷\"做客\"。你感到一阵不寒而栗。",
        },
        ForcedEvent {
            id: "chili-proposal",
            name: "赤璃的提议",
            trigger_day: 10,
            trigger_period: Some(3),
            description: "在天机城偶遇赤璃，他提出带你去万妖森林，用妖族秘法帮你度过朔月之夜。",
        },
        ForcedEvent {
            id: "new-moon-night",
            name: "朔月暴露",
            trigger_day: 16,
            trigger_period: Some(5),
            description: "今夜，月亮不会升起。你感到体内灵气剧烈波动，九叶灵芝本体开始显现...",
        },
        ForcedEvent {
            id: "three-way-choice",
            name: "三方势力的选择",
            trigger_day: 18,
            trigger_period: Some(2),
            description: "丹辰子、叶青霜、赤璃同时向你抛出橄榄枝。你必须做出选择——或者谁也不信。",
        },
        ForcedEvent {
            id: "pool-clue",
            name: "化形池线索",
            trigger_day: 22,
            trigger_period: None,
            description: "三块玉片合在一起发出柔和光芒，浮现出一幅地图，指向万妖森林最深处。",
        },
        ForcedEvent {
            id: "yeqingshuang-truth",
            name: "叶青霜真实身份",
            trigger_day: 25,
            trigger_period: Some(4),
            description: "叶青霜终于向你坦白——\"我和你一样，也是灵草成精。百年前的七叶雪莲...\"",
        },
    ];

    pub static ref ENDINGS: Vec<Ending> = vec![
        Ending {
            id: "te-true-person",
            name: "真正的人",
            ending_type: EndingType::TE,
            description: "你在最后一刻拒绝了化形池，选择以灵草之身继续做人。叶青霜告诉你另一个方法——用百年时间慢慢修炼，最终可以真正化形。虽然漫长，但你是自由的。",
            condition: "叶青霜好感≥80 且 信任≥60 且 集齐线索碎片 且 触发叶青霜真实身份",
        },
        Ending {
            id: "he-demon-flower",
            name: "妖界之花",
            ending_type: EndingType::HE,
            description: "你接受了赤璃的提议，进入化形池。你失去了人形，但获得了真正的自由。在妖界你不再是\"药\"，而是被尊敬的\"妖\"。你和赤璃一起，守护着妖界的边界。",
            condition: "赤璃好感≥80 且 同化≥60",
        },
        Ending {
            id: "be-alchemy",
            name: "丹炉中的永生",
            ending_type: EndingType::BE,
            description: "你被丹辰子炼成了九转还魂丹。奇怪的是你并没有死——你的意识被困在丹药中，永远感受着被吞噬的痛苦。",
            condition: "丹辰子觊觎度达到100",
        },
        Ending {
            id: "be-prey",
            name: "猎物的末路",
            ending_type: EndingType::BE,
            description: "你在朔月之夜暴露了本体，被闻讯而来的修士们分食。你的最后一丝意识，是感受着身体被撕裂的痛苦。",
            condition: "朔月之夜暴露且无人庇护",
        },
        Ending {
            id: "ne-half",
            name: "半人半草",
            ending_type: EndingType::NE,
            description: "你离开了化形池，继续在修仙界流浪。既没有成为真正的人，也没有成为妖。这种生活很艰难，但你还在坚持。",
            condition: "所有角色好感度<60 且 到达化形池但选择离开",
        },
    ];
}

pub const STORY_INFO: StoryInfo = StoryInfo {
    genre: "仙侠修真",
    title: "灵草修仙录",
    subtitle: "Spirit Herb Chronicle · 修仙文字冒险",
    description: "天元历三千七百年，一株千年九叶灵芝在山野灵气中孕育千年，终于化形成人。你睁开眼睛，第一次以人类的视角打量这个世界——但很快你就会发现，这个世界对\"灵草成精\"的态度，远比你想象的更加危险...",
    goals: &[
        "在 30 天内找到传说中的化形池",
        "在三方势力中周旋求存",
        "在朔月之夜守住灵草身份的秘密",
        "做出最终选择——成人、成妖、还是寻找第三条路",
    ],
};

// ============================================================================
// Lookups
// ============================================================================

/// Relationship tier for a positive stat value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatLevel {
    pub level: u8,
    pub name: &'static str,
}

pub fn stat_level(value: i32) -> StatLevel {
    if value >= 80 {
        StatLevel { level: 4, name: "深度羁绊" }
    } else if value >= 60 {
        StatLevel { level: 3, name: "关系亲密" }
    } else if value >= 30 {
        StatLevel { level: 2, name: "逐渐了解" }
    } else {
        StatLevel { level: 1, name: "初步接触" }
    }
}

/// Characters visible on the given day, filtered by `join_day`.
pub fn available_characters<'a>(
    day: u32,
    characters: &'a HashMap<String, Character>,
) -> Vec<&'a Character> {
    let mut chars: Vec<_> = characters.values().filter(|c| c.join_day <= day).collect();
    // Deterministic order for prompt construction.
    chars.sort_by_key(|c| c.id);
    chars
}

/// The unique chapter whose day range contains `day`.
pub fn current_chapter(day: u32) -> &'static Chapter {
    CHAPTERS
        .iter()
        .find(|ch| day >= ch.day_range.0 && day <= ch.day_range.1)
        .unwrap_or(&CHAPTERS[0])
}

/// Forced events due on `day` that have not fired yet.
pub fn pending_day_events(day: u32, triggered: &[String]) -> Vec<&'static ForcedEvent> {
    FORCED_EVENTS
        .iter()
        .filter(|e| e.trigger_day == day && !triggered.iter().any(|t| t == e.id))
        .collect()
}

/// Whether a scene's unlock condition currently evaluates true.
pub fn scene_unlockable(
    scene: &Scene,
    triggered: &[String],
    stats: &HashMap<String, CharacterStats>,
) -> bool {
    let Some(cond) = &scene.unlock_condition else {
        return true;
    };
    if let Some(event) = cond.event {
        if !triggered.iter().any(|t| t == event) {
            return false;
        }
    }
    if let Some(req) = &cond.stat {
        let value = stats
            .get(req.char_id)
            .and_then(|s| s.get(req.key))
            .copied()
            .unwrap_or(0);
        if value < req.min {
            return false;
        }
    }
    true
}
