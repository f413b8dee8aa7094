//! QA tests for the scripted game flow.
//!
//! These drive the real state machine through `TestHarness` and `MockNarrator`,
//! without API calls. They verify:
//! - Full turns: dialogue, deltas, speaker attribution, choices
//! - Forced events and scene unlocks along the calendar
//! - Item use and its side effects
//! - Ending priority across whole playthroughs

use herb_core::data::{Gender, MAX_DAYS, PERIODS};
use herb_core::testing::{
    assert_ending, assert_event_triggered, assert_no_ending, assert_scene_unlocked, assert_stat,
    TestHarness,
};
use herb_core::TurnOutcome;

// =============================================================================
// TURN FLOW
// =============================================================================

#[test]
fn test_full_turn_applies_deltas_and_choices() {
    let mut harness = TestHarness::new();
    harness.expect_narrative(
        "【叶青霜】（收剑入鞘，瞥了你一眼）\"还不走？\"\n\
         【叶青霜】好感+10\n\n\
         你的选择：\n\
         1. 道谢后离开\n\
         2. 询问她的名字\n\
         3. 默默跟上去",
    );

    let outcome = harness.action("帮助她对付丹辰子的弟子");
    assert_eq!(outcome, TurnOutcome::Accepted);
    assert_stat(&harness, "yeqingshuang", "affection", 10);
    assert_eq!(
        harness.state.choices,
        vec!["道谢后离开", "询问她的名字", "默默跟上去"]
    );

    let last = harness.state.messages.last().unwrap();
    assert_eq!(last.character.as_deref(), Some("yeqingshuang"));
    assert!(!last.content.contains("你的选择"));
    assert!(!harness.state.is_typing);
}

#[test]
fn test_turn_without_choices_synthesizes_fallbacks() {
    let mut harness = TestHarness::new();
    harness.state.select_character(Some("danchenzi".to_string()));
    harness.expect_narrative("【丹辰子】（抚须微笑）\"小友何必拘谨。\"");

    harness.action("向丹辰子行礼");
    assert_eq!(harness.state.choices.len(), 4);
    assert!(harness.state.choices.iter().any(|c| c.contains("丹辰子")));
}

#[test]
fn test_second_action_rejected_while_turn_unresolved() {
    let mut harness = TestHarness::new();
    harness.state.begin_turn("第一动");
    assert_eq!(harness.action("第二动"), TurnOutcome::Rejected);
}

#[test]
fn test_actions_rejected_after_ending() {
    let mut harness = TestHarness::new();
    harness.state.set_ending("ne-half");
    assert_eq!(harness.action("继续行动"), TurnOutcome::Rejected);
}

#[test]
fn test_clamp_holds_across_repeated_deltas() {
    let mut harness = TestHarness::new();
    for _ in 0..20 {
        harness.expect_narrative("【叶青霜】好感+15");
    }
    for i in 0..20 {
        harness.action(&format!("讨好{i}"));
    }
    assert_stat(&harness, "yeqingshuang", "affection", 100);

    for _ in 0..20 {
        harness.expect_narrative("【叶青霜】好感-15");
    }
    for i in 0..20 {
        harness.action(&format!("冒犯{i}"));
    }
    assert_stat(&harness, "yeqingshuang", "affection", 0);
}

#[test]
fn test_turn_writes_story_record() {
    let mut harness = TestHarness::new();
    let before = harness.state.story_records.len();
    harness.expect_narrative("山道蜿蜒，你一路向北。");
    harness.action("沿着山道北行，寻找出山的路径");

    assert_eq!(harness.state.story_records.len(), before + 1);
    let record = harness.state.story_records.last().unwrap();
    assert_eq!(record.day, 1);
    assert_eq!(record.period, "清晨");
}

// =============================================================================
// CALENDAR, EVENTS, UNLOCKS
// =============================================================================

#[test]
fn test_day_three_meeting_unlocks_city() {
    let mut harness = TestHarness::new();
    harness.advance_to_day(3);
    assert_no_ending(&harness);

    // The meeting fires in the late morning.
    harness.advance(1);
    assert_event_triggered(&harness, "meet-yeqingshuang");
    assert_scene_unlocked(&harness, "tianjicheng");
}

#[test]
fn test_scene_selection_respects_locks() {
    let mut harness = TestHarness::new();
    harness.state.select_scene("forest");
    assert_eq!(harness.state.current_scene, "cave");

    harness.advance_to_day(10);
    harness.advance(3); // chili-proposal fires in the afternoon
    assert_event_triggered(&harness, "chili-proposal");
    assert_scene_unlocked(&harness, "forest");

    harness.state.select_scene("forest");
    assert_eq!(harness.state.current_scene, "forest");
}

#[test]
fn test_coveting_drifts_daily_and_talisman_counters_it() {
    let mut harness = TestHarness::new();
    assert_stat(&harness, "danchenzi", "coveting", 50);

    harness.advance(PERIODS.len()); // day 2: +5
    assert_stat(&harness, "danchenzi", "coveting", 55);

    harness.state.use_item("concealment-talisman");
    assert_stat(&harness, "danchenzi", "coveting", 45);
    assert_eq!(harness.state.inventory["concealment-talisman"], 2);
}

#[test]
fn test_new_moon_countdown_reaches_night() {
    let mut harness = TestHarness::new();
    // Keep coveting down so the run does not end early.
    for _ in 0..20 {
        harness.state.use_item("concealment-talisman");
        harness
            .state
            .inventory
            .insert("concealment-talisman".to_string(), 3);
    }

    harness.advance_to_day(16);
    assert!(harness.state.is_new_moon_night);
    assert_eq!(harness.state.new_moon_countdown, 0);
}

// =============================================================================
// ENDINGS
// =============================================================================

/// Hold coveting down every day so drift never ends the run early.
fn suppress_coveting(harness: &mut TestHarness) {
    harness
        .state
        .character_stats
        .get_mut("danchenzi")
        .unwrap()
        .insert("coveting".to_string(), 0);
}

fn run_to_final_boundary(harness: &mut TestHarness) {
    while harness.state.ending_id.is_none()
        && !(harness.state.current_day >= MAX_DAYS
            && harness.state.current_period == PERIODS.len() - 1)
    {
        harness.advance(1);
        suppress_coveting(harness);
    }
    if harness.state.ending_id.is_none() {
        harness.state.check_ending();
    }
}

#[test]
fn test_alchemy_ending_fires_mid_game() {
    let mut harness = TestHarness::new();
    harness
        .state
        .character_stats
        .get_mut("danchenzi")
        .unwrap()
        .insert("coveting".to_string(), 95);

    harness.advance(PERIODS.len()); // drift to 100 on the day wrap
    assert_ending(&harness, "be-alchemy");
    assert!(harness.state.current_day < MAX_DAYS);
}

#[test]
fn test_true_ending_with_full_requirements() {
    let mut harness = TestHarness::with_player(Gender::Female, "芷兰");
    {
        let yq = harness.state.character_stats.get_mut("yeqingshuang").unwrap();
        yq.insert("affection".to_string(), 85);
        yq.insert("trust".to_string(), 70);
    }
    for _ in 0..3 {
        harness.state.gain_item("pool-fragment");
    }

    run_to_final_boundary(&mut harness);
    assert_event_triggered(&harness, "yeqingshuang-truth");
    assert_ending(&harness, "te-true-person");
}

#[test]
fn test_demon_ending_when_true_path_incomplete() {
    let mut harness = TestHarness::new();
    {
        let cl = harness.state.character_stats.get_mut("chili").unwrap();
        cl.insert("affection".to_string(), 90);
        cl.insert("assimilation".to_string(), 70);
    }

    run_to_final_boundary(&mut harness);
    assert_ending(&harness, "he-demon-flower");
}

#[test]
fn test_normal_ending_as_fallback() {
    let mut harness = TestHarness::new();
    run_to_final_boundary(&mut harness);
    assert_ending(&harness, "ne-half");
}

#[test]
fn test_only_first_ending_sticks() {
    let mut harness = TestHarness::new();
    harness.state.set_ending("be-prey");
    harness.state.check_ending();
    assert_ending(&harness, "be-prey");
}
