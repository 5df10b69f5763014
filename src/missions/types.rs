//! Core data model for mission content and runtime bookkeeping.
//!
//! Content types (`MissionEvent`, `TriggerConfig`, `Action`, ...) deserialize from
//! the camelCase JSON format mission files are written in. Runtime types
//! (`EventOutcome`, `EventStatus`) are produced by the event scheduler.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::condition::Value;
use super::factory::MissionFactory;

/// Variable bindings produced by a template's factory when a mission starts.
pub type Variables = BTreeMap<String, String>;

/// Identifier of a mission template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TemplateId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of one running mission instance (`mission_<n>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionId(String);

impl MissionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn from_sequence(n: u64) -> Self {
        Self(format!("mission_{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MissionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One step of a mission script: a single-key map `{kind: params}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: String,
    pub params: serde_json::Value,
}

impl Action {
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.kind, &self.params)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        if map.len() != 1 {
            return Err(D::Error::custom(format!(
                "an action must be a map with exactly one key, found {} keys",
                map.len()
            )));
        }
        match map.into_iter().next() {
            Some((kind, params)) => Ok(Action { kind, params }),
            None => Err(D::Error::custom("empty action map")),
        }
    }
}

/// Wrapper used by `onTrigger` / `onTimeout` blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionBlock {
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// What a trigger listens to and how it filters emissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Host name for remote addressing; absent means the local environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_name: Option<String>,
    pub target: String,
    pub method: String,
    /// Comma separated names bound to the leading emitted arguments.
    #[serde(default)]
    pub condition_args: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub subscribe: Subscription,
    #[serde(default)]
    pub on_trigger: ActionBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    /// Milliseconds before the timeout side wins the race.
    pub delay: u64,
    #[serde(default)]
    pub on_timeout: ActionBlock,
}

/// A named unit of a template: immediate actions, a trigger, a timeout, or a race.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

impl MissionEvent {
    pub fn immediate(actions: Vec<Action>) -> Self {
        Self {
            actions: Some(actions),
            ..Default::default()
        }
    }

    /// True when the event arms a trigger and/or a timeout.
    pub fn is_race(&self) -> bool {
        self.trigger.is_some() || self.timeout.is_some()
    }
}

/// Apps granted on success: one name or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppInstall {
    One(String),
    Many(Vec<String>),
}

impl AppInstall {
    pub fn names(&self) -> Vec<&str> {
        match self {
            AppInstall::One(name) => vec![name.as_str()],
            AppInstall::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecoins: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<AppInstall>,
}

/// Immutable content unit describing a schedulable mission.
#[derive(Clone)]
pub struct MissionTemplate {
    pub id: TemplateId,
    pub title: String,
    pub blocked_until: Vec<String>,
    pub blocked_by: Vec<String>,
    pub requires_min_reputation: Option<i64>,
    pub max_concurrent_instances: Option<usize>,
    pub max_success_completions: Option<u64>,
    pub min_seconds_before_retry_after_failure: Option<u64>,
    pub success_unblocks: Vec<String>,
    pub success_blocks: Vec<String>,
    pub reward: Option<Reward>,
    pub factory: Arc<dyn MissionFactory>,
    pub events_initial: BTreeMap<String, MissionEvent>,
    pub events: BTreeMap<String, MissionEvent>,
}

impl MissionTemplate {
    /// A template with no gates, no effects, no events, and an empty factory.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: TemplateId::new(id),
            title: title.into(),
            blocked_until: Vec::new(),
            blocked_by: Vec::new(),
            requires_min_reputation: None,
            max_concurrent_instances: None,
            max_success_completions: None,
            min_seconds_before_retry_after_failure: None,
            success_unblocks: Vec::new(),
            success_blocks: Vec::new(),
            reward: None,
            factory: Arc::new(super::factory::StaticVariables::default()),
            events_initial: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for MissionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MissionTemplate")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("blocked_until", &self.blocked_until)
            .field("blocked_by", &self.blocked_by)
            .field("events_initial", &self.events_initial.keys())
            .field("events", &self.events.keys())
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of one arming of a named event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Instant,
    Triggered,
    Timedout,
    Cancelled,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStatus::Pending => "pending",
            EventStatus::Instant => "instant",
            EventStatus::Triggered => "triggered",
            EventStatus::Timedout => "timed out",
            EventStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal record of one arming. Never modified once written.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub status: EventStatus,
    pub timestamp: DateTime<Utc>,
    pub original_config: MissionEvent,
    /// Emitted arguments (after truncation) that satisfied the trigger.
    pub trigger_args: Option<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_round_trips_as_single_key_map() {
        let action: Action = serde_json::from_value(json!({"send": ["{{npc}}", "hi"]})).unwrap();
        assert_eq!(action.kind, "send");
        assert_eq!(action.params, json!(["{{npc}}", "hi"]));
        assert_eq!(serde_json::to_value(&action).unwrap(), json!({"send": ["{{npc}}", "hi"]}));
    }

    #[test]
    fn action_with_two_keys_is_rejected() {
        let err = serde_json::from_value::<Action>(json!({"send": [], "delay": 5})).unwrap_err();
        assert!(err.to_string().contains("exactly one key"));
    }

    #[test]
    fn event_parses_trigger_and_timeout() {
        let event: MissionEvent = serde_json::from_value(json!({
            "trigger": {
                "subscribe": {
                    "target": "service.chat",
                    "method": "onMessageSentTo",
                    "conditionArgs": "toId, message",
                    "condition": "toId == 'x'"
                },
                "onTrigger": { "actions": [ { "delay": 10 } ] }
            },
            "timeout": { "delay": 500, "onTimeout": { "actions": [] } }
        }))
        .unwrap();
        assert!(event.is_race());
        assert!(event.actions.is_none());
        let trigger = event.trigger.unwrap();
        assert_eq!(trigger.subscribe.registry_name, None);
        assert_eq!(trigger.on_trigger.actions.len(), 1);
        assert_eq!(event.timeout.unwrap().delay, 500);
    }

    #[test]
    fn install_accepts_one_or_many() {
        let one: Reward = serde_json::from_value(json!({"install": "ByteWallet"})).unwrap();
        assert_eq!(one.install.unwrap().names(), vec!["ByteWallet"]);
        let many: Reward = serde_json::from_value(json!({"install": ["A", "B"]})).unwrap();
        assert_eq!(many.install.unwrap().names(), vec!["A", "B"]);
    }

    #[test]
    fn mission_ids_follow_sequence_format() {
        assert_eq!(MissionId::from_sequence(7).as_str(), "mission_7");
    }
}
