mod common;

use chrono::Duration;
use common::{harness, template};
use missiond::missions::{Eligibility, MissionError, TemplateId};
use serde_json::json;

#[test]
fn unlock_gate_truth_table() {
    let t = template(json!({
        "templateID": "t", "title": "T",
        "blockedUntil": ["A", "B"],
        "blockedBy": ["X", "Y"]
    }));
    let h = harness(vec![t.clone()]);
    let m = &h.manager;

    // (unlocked keys, expected)
    let cases: &[(&[&str], bool)] = &[
        (&[], false),
        (&["A"], false),
        (&["A", "B"], true),
        (&["A", "B", "X"], false),
        (&["A", "B", "Y"], false),
        (&["B", "Y"], false),
    ];
    for &(keys, expected) in cases {
        let all: Vec<String> = m.unlocked_keys();
        m.lock(&all);
        m.unlock(keys);
        assert_eq!(m.is_mission_unlocked(&t), expected, "unlocked keys {:?}", keys);
    }
}

#[test]
fn empty_gates_are_always_unlocked() {
    let t = template(json!({"templateID": "free", "title": "Free"}));
    let h = harness(vec![t.clone()]);
    assert!(h.manager.is_mission_unlocked(&t));
    assert!(h.manager.is_mission_resource_met(&t));
    assert!(h.manager.is_mission_parallelizable(&t));
    assert!(h.manager.is_mission_rerunnable(&t));
    assert!(h.manager.has_mission_waited_enough_between_retries(&t));
    assert!(h.manager.eligibility(&t).can_start());
}

#[test]
fn reputation_requirement() {
    let t = template(json!({"templateID": "rep", "title": "Rep", "requiresMinReputation": 10}));
    let h = harness(vec![t.clone()]);
    assert!(!h.manager.is_mission_resource_met(&t));
    h.env.reputation.alter_reputation(9);
    assert!(!h.manager.is_mission_resource_met(&t));
    h.env.reputation.alter_reputation(1);
    assert!(h.manager.is_mission_resource_met(&t));
}

#[tokio::test]
async fn concurrency_limit_counts_active_instances() {
    let t = template(json!({"templateID": "par", "title": "Par", "maxConcurrentInstances": 2}));
    let h = harness(vec![t.clone()]);
    let id = TemplateId::new("par");

    let first = h.manager.start_mission(&id, false).unwrap();
    assert!(h.manager.is_mission_parallelizable(&t));
    h.manager.start_mission(&id, false).unwrap();
    assert!(!h.manager.is_mission_parallelizable(&t));

    match h.manager.start_mission(&id, false) {
        Err(MissionError::IneligibleMission { template, eligibility }) => {
            assert_eq!(template, id);
            assert!(!eligibility.parallelizable);
            assert!(eligibility.unlocked && eligibility.rerunnable);
            assert_eq!(eligibility.to_string(), "failed: parallel");
        }
        other => panic!("expected IneligibleMission, got {:?}", other),
    }

    // force skips every gate
    h.manager.start_mission(&id, true).unwrap();
    assert_eq!(h.manager.active_instances_of(&id), 3);

    h.manager.end_mission_failure(&first).unwrap();
    assert_eq!(h.manager.active_instances_of(&id), 2);
    assert!(!h.manager.is_mission_parallelizable(&t));
}

#[tokio::test]
async fn completion_limit_counts_successes_only() {
    let t = template(json!({"templateID": "once", "title": "Once", "maxSuccessCompletions": 1}));
    let h = harness(vec![t.clone()]);
    let id = TemplateId::new("once");

    let failed = h.manager.start_mission(&id, false).unwrap();
    h.manager.end_mission_failure(&failed).unwrap();
    assert!(h.manager.is_mission_rerunnable(&t));

    let won = h.manager.start_mission(&id, false).unwrap();
    h.manager.end_mission_success(&won).unwrap();
    assert!(!h.manager.is_mission_rerunnable(&t));
    assert_eq!(h.manager.count_attempted(&id), 2);
    assert_eq!(h.manager.count_succeeded(&id), 1);
    assert_eq!(h.manager.count_failed(&id), 1);
}

#[tokio::test]
async fn cooldown_runs_from_latest_start_or_end() {
    let t = template(json!({
        "templateID": "cool", "title": "Cool",
        "minSecondsBeforeRetryAfterFailure": 10
    }));
    let h = harness(vec![t.clone()]);
    let id = TemplateId::new("cool");

    assert!(h.manager.has_mission_waited_enough_between_retries(&t));
    let mission = h.manager.start_mission(&id, false).unwrap();
    assert!(!h.manager.has_mission_waited_enough_between_retries(&t));

    h.clock.advance(Duration::seconds(3));
    h.manager.end_mission_failure(&mission).unwrap();

    // strictly later than end + cooldown
    h.clock.advance(Duration::seconds(10));
    assert!(!h.manager.has_mission_waited_enough_between_retries(&t));
    h.clock.advance(Duration::seconds(1));
    assert!(h.manager.has_mission_waited_enough_between_retries(&t));
    assert!(h.manager.can_start_mission(&t));
}

#[tokio::test]
async fn oversized_cooldown_blocks_instead_of_panicking() {
    for cooldown in [10_000_000_000_000_000u64, i64::MAX as u64, u64::MAX] {
        let t = template(json!({
            "templateID": "slow", "title": "Slow",
            "minSecondsBeforeRetryAfterFailure": cooldown
        }));
        let h = harness(vec![t.clone()]);
        let id = TemplateId::new("slow");

        let mission = h.manager.start_mission(&id, false).unwrap();
        h.manager.end_mission_failure(&mission).unwrap();
        h.clock.advance(Duration::days(365 * 100));

        assert!(!h.manager.has_mission_waited_enough_between_retries(&t), "cooldown {}", cooldown);
        assert!(!h.manager.can_start_mission(&t));
        assert!(matches!(
            h.manager.start_mission(&id, false),
            Err(MissionError::IneligibleMission { .. })
        ));
    }
}

#[test]
fn eligible_templates_filters_by_every_gate() {
    let open = template(json!({"templateID": "open", "title": "Open"}));
    let gated = template(json!({"templateID": "gated", "title": "Gated", "blockedUntil": ["ACT1"]}));
    let rich = template(json!({"templateID": "rich", "title": "Rich", "requiresMinReputation": 50}));
    let h = harness(vec![open, gated, rich]);

    let ids = |h: &common::Harness| -> Vec<String> {
        h.manager
            .eligible_templates()
            .iter()
            .map(|t| t.id.to_string())
            .collect()
    };
    assert_eq!(ids(&h), vec!["open"]);
    h.manager.unlock(&["ACT1"]);
    assert_eq!(ids(&h), vec!["gated", "open"]);
    h.env.reputation.alter_reputation(50);
    assert_eq!(ids(&h), vec!["gated", "open", "rich"]);
    assert_eq!(h.manager.all_templates().len(), 3);
}

#[tokio::test]
async fn every_gate_is_required() {
    let gated = json!({
        "templateID": "all", "title": "All gates",
        "blockedUntil": ["KEY"],
        "requiresMinReputation": 5,
        "maxConcurrentInstances": 1,
        "maxSuccessCompletions": 1,
        "minSecondsBeforeRetryAfterFailure": 10
    });

    for mask in 0u8..32 {
        let want = Eligibility {
            unlocked: mask & 1 != 0,
            resource_met: mask & 2 != 0,
            parallelizable: mask & 4 != 0,
            rerunnable: mask & 8 != 0,
            waited_enough: mask & 16 != 0,
        };
        let t = template(gated.clone());
        let h = harness(vec![t.clone()]);
        let id = TemplateId::new("all");

        // an earlier failed attempt arms the cooldown
        let failed = h.manager.start_mission(&id, true).unwrap();
        h.manager.end_mission_failure(&failed).unwrap();
        if !want.rerunnable {
            let won = h.manager.start_mission(&id, true).unwrap();
            h.manager.end_mission_success(&won).unwrap();
        }
        if !want.parallelizable {
            h.manager.start_mission(&id, true).unwrap();
        }
        if want.waited_enough {
            h.clock.advance(Duration::seconds(11));
        }
        if want.unlocked {
            h.manager.unlock(&["KEY"]);
        }
        if want.resource_met {
            h.env.reputation.alter_reputation(5);
        }

        assert_eq!(h.manager.eligibility(&t), want, "mask {:05b}", mask);
        assert_eq!(h.manager.can_start_mission(&t), mask == 31, "mask {:05b}", mask);
    }
}

#[tokio::test]
async fn single_instance_with_retry_cooldown() {
    let t = template(json!({
        "templateID": "solo", "title": "Solo",
        "maxConcurrentInstances": 1,
        "minSecondsBeforeRetryAfterFailure": 30
    }));
    let h = harness(vec![t.clone()]);
    let id = TemplateId::new("solo");

    let first = h.manager.start_mission(&id, false).unwrap();
    match h.manager.start_mission(&id, false) {
        Err(MissionError::IneligibleMission { eligibility, .. }) => {
            assert!(!eligibility.parallelizable);
        }
        other => panic!("expected IneligibleMission, got {:?}", other),
    }

    h.manager.end_mission_failure(&first).unwrap();
    h.clock.advance(Duration::seconds(10));
    match h.manager.start_mission(&id, false) {
        Err(MissionError::IneligibleMission { eligibility, .. }) => {
            assert!(eligibility.parallelizable);
            assert!(!eligibility.waited_enough);
            assert_eq!(eligibility.to_string(), "failed: cooldown");
        }
        other => panic!("expected IneligibleMission, got {:?}", other),
    }

    h.clock.advance(Duration::seconds(21));
    let retry = h.manager.start_mission(&id, false).unwrap();
    assert_ne!(retry, first);
    assert_eq!(h.manager.count_attempted(&id), 2);
    assert_eq!(h.manager.count_failed(&id), 1);
}
