//! JSON mission content loader.
//!
//! Mission files live in `data/missions/`. A file holds either one template
//! object or an array of them; a directory is scanned (non-recursively) for
//! `*.json` files in name order. Field names are camelCase:
//!
//! ```json
//! {
//!   "templateID": "wifi_reset_mission",
//!   "title": "Home WiFi Reset",
//!   "blockedBy": ["ACT1+"],
//!   "successUnblocks": ["ACT1", "ACT1+"],
//!   "maxConcurrentInstances": 1,
//!   "setup": { "npcs": [ ... ], "variables": { ... } },
//!   "eventsInitial": { "start_mission": { "actions": [ ... ] } },
//!   "events": { ... }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::errors::Result;
use super::factory::DeclarativeSetup;
use super::types::{MissionEvent, MissionTemplate, Reward, TemplateId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateDocument {
    #[serde(rename = "templateID")]
    template_id: String,
    title: String,
    #[serde(default)]
    blocked_until: Vec<String>,
    #[serde(default)]
    blocked_by: Vec<String>,
    #[serde(default)]
    requires_min_reputation: Option<i64>,
    #[serde(default)]
    max_concurrent_instances: Option<usize>,
    #[serde(default)]
    max_success_completions: Option<u64>,
    #[serde(default)]
    min_seconds_before_retry_after_failure: Option<u64>,
    #[serde(default)]
    success_unblocks: Vec<String>,
    #[serde(default)]
    success_blocks: Vec<String>,
    #[serde(default)]
    reward: Option<Reward>,
    #[serde(default)]
    setup: DeclarativeSetup,
    #[serde(default)]
    events_initial: BTreeMap<String, MissionEvent>,
    #[serde(default)]
    events: BTreeMap<String, MissionEvent>,
}

impl From<TemplateDocument> for MissionTemplate {
    fn from(doc: TemplateDocument) -> Self {
        MissionTemplate {
            id: TemplateId::new(doc.template_id),
            title: doc.title,
            blocked_until: doc.blocked_until,
            blocked_by: doc.blocked_by,
            requires_min_reputation: doc.requires_min_reputation,
            max_concurrent_instances: doc.max_concurrent_instances,
            max_success_completions: doc.max_success_completions,
            min_seconds_before_retry_after_failure: doc.min_seconds_before_retry_after_failure,
            success_unblocks: doc.success_unblocks,
            success_blocks: doc.success_blocks,
            reward: doc.reward,
            factory: Arc::new(doc.setup),
            events_initial: doc.events_initial,
            events: doc.events,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TemplateFile {
    Many(Vec<TemplateDocument>),
    One(Box<TemplateDocument>),
}

/// Load templates from a single JSON file or from every `*.json` file in a directory.
pub fn load_templates_from_json<P: AsRef<Path>>(path: P) -> Result<Vec<MissionTemplate>> {
    let path = path.as_ref();
    if !path.is_dir() {
        return load_file(path);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut templates = Vec::new();
    for file in files {
        templates.extend(load_file(&file)?);
    }
    Ok(templates)
}

/// Parse templates from JSON text holding one template object or an array.
pub fn templates_from_str(contents: &str) -> Result<Vec<MissionTemplate>> {
    let docs = match serde_json::from_str::<TemplateFile>(contents)? {
        TemplateFile::Many(docs) => docs,
        TemplateFile::One(doc) => vec![*doc],
    };
    Ok(docs.into_iter().map(MissionTemplate::from).collect())
}

fn load_file(path: &Path) -> Result<Vec<MissionTemplate>> {
    let contents = fs::read_to_string(path)?;
    let templates = templates_from_str(&contents).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to parse {}: {}", path.display(), e),
        )
    })?;
    debug!("{}: {} templates", path.display(), templates.len());
    Ok(templates)
}
