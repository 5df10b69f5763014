//! Test utilities & fixtures shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use missiond::missions::{
    templates_from_str, ActionRegistry, ManualClock, MissionManager, MissionTemplate, TemplateRegistry,
};
use missiond::services::Environment;

pub struct Harness {
    pub manager: Arc<MissionManager>,
    pub clock: Arc<ManualClock>,
    pub env: Environment,
}

/// Manager over `templates` with a fresh environment and a clock frozen at 2024-01-01.
pub fn harness(templates: Vec<MissionTemplate>) -> Harness {
    harness_with_registry(TemplateRegistry::with_templates(templates))
}

pub fn harness_with_registry(registry: TemplateRegistry) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    let env = Environment::new();
    let manager = MissionManager::new(
        registry,
        env.clone(),
        Arc::new(ActionRegistry::with_builtin_handlers()),
        clock.clone(),
    );
    Harness { manager, clock, env }
}

/// Parse one template from inline JSON.
pub fn template(json: serde_json::Value) -> MissionTemplate {
    templates_from_str(&json.to_string())
        .expect("template json")
        .remove(0)
}

/// Let spawned action tasks and timers run. Use with `start_paused = true`.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Bundled mission content under `data/missions`.
pub fn content_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join("missions")
}

/// Contents of every message in a conversation, oldest first.
pub fn transcript(env: &Environment, contact: &str) -> Vec<String> {
    env.chat
        .messages_for(contact)
        .into_iter()
        .map(|m| m.content)
        .collect()
}
