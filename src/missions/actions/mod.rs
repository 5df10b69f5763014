//! Action vocabulary for mission scripts.
//!
//! An action in content is a single-key map `{kind: params}`. The
//! [`ActionRegistry`] maps each kind to an [`ActionHandler`] and dispatches
//! to it with a [`MissionContext`]. Built-in kinds:
//!
//! | kind                | params                                   |
//! |---------------------|------------------------------------------|
//! | `send`              | `[contactId, message]`                   |
//! | `delay`             | `ms` or `[ms]`                           |
//! | `schedule`          | `event` or `[event]`                     |
//! | `cancel`            | `event` or `[event]`                     |
//! | `conditional`       | `[condition, thenActions, elseActions]`  |
//! | `missionSucceeded`  | `message` or `[message]` (optional)      |
//! | `missionFailed`     | `message` or `[message]` (optional)      |
//! | `sharescannedcreds` | `contactId` or `[contactId]`             |
//!
//! Extension handlers are added with [`ActionRegistry::register`]; the
//! dispatcher needs no changes.

mod conditional;
mod delay;
mod events;
mod mission_end;
mod send;
mod share_scanned_creds;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use log::trace;
use serde_json::Value as Json;

pub use conditional::ConditionalAction;
pub use delay::DelayAction;
pub use events::{CancelAction, ScheduleAction};
pub use mission_end::{MissionFailedAction, MissionSucceededAction};
pub use send::SendAction;
pub use share_scanned_creds::ShareScannedCredsAction;

use super::errors::{MissionError, Result};
use super::mission::MissionContext;

pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Implementation of one action kind.
pub trait ActionHandler: Send + Sync {
    /// Name the handler is registered under.
    fn kind(&self) -> &'static str;

    fn execute<'a>(&'a self, params: &'a Json, ctx: &'a MissionContext) -> ActionFuture<'a>;
}

pub type BoxedActionHandler = Arc<dyn ActionHandler>;

#[derive(Default)]
pub struct ActionRegistry {
    handlers: RwLock<HashMap<String, BoxedActionHandler>>,
}

impl ActionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in action kind.
    pub fn with_builtin_handlers() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(SendAction));
        registry.register(Arc::new(DelayAction));
        registry.register(Arc::new(ScheduleAction));
        registry.register(Arc::new(CancelAction));
        registry.register(Arc::new(ConditionalAction));
        registry.register(Arc::new(MissionSucceededAction));
        registry.register(Arc::new(MissionFailedAction));
        registry.register(Arc::new(ShareScannedCredsAction::new()));
        registry
    }

    /// Register a handler under its kind, replacing any previous handler.
    pub fn register(&self, handler: BoxedActionHandler) {
        let kind = handler.kind().to_string();
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, handler);
    }

    pub fn get(&self, kind: &str) -> Option<BoxedActionHandler> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(kind)
            .cloned()
    }

    pub async fn execute_action(&self, kind: &str, params: &Json, ctx: &MissionContext) -> Result<()> {
        let handler = self
            .get(kind)
            .ok_or_else(|| MissionError::UnknownAction(kind.to_string()))?;
        trace!("[{}] action {} {}", ctx.mission_id(), kind, params);
        handler.execute(params, ctx).await
    }

    /// Registered kinds, sorted.
    pub fn available_actions(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }
}

/// A string given bare or as a one-element list.
pub(crate) fn single_string<'a>(kind: &str, params: &'a Json) -> Result<&'a str> {
    match params {
        Json::String(s) => Ok(s),
        Json::Array(items) if items.len() == 1 => items[0]
            .as_str()
            .ok_or_else(|| MissionError::invalid_params(kind, "expected a string")),
        _ => Err(MissionError::invalid_params(kind, format!("expected a string or [string], got {}", params))),
    }
}

/// Like [`single_string`], but `null` or an empty list is allowed.
pub(crate) fn optional_string<'a>(kind: &str, params: &'a Json) -> Result<Option<&'a str>> {
    match params {
        Json::Null => Ok(None),
        Json::Array(items) if items.is_empty() => Ok(None),
        _ => single_string(kind, params).map(Some),
    }
}

/// A non-negative integer given bare or as a one-element list.
pub(crate) fn single_number(kind: &str, params: &Json) -> Result<u64> {
    let value = match params {
        Json::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };
    value
        .as_u64()
        .ok_or_else(|| MissionError::invalid_params(kind, format!("expected a non-negative number or [number], got {}", params)))
}

/// Exactly `n` strings in a list.
pub(crate) fn string_list<'a>(kind: &str, params: &'a Json, n: usize) -> Result<Vec<&'a str>> {
    let items = params
        .as_array()
        .filter(|items| items.len() == n)
        .ok_or_else(|| MissionError::invalid_params(kind, format!("expected a list of {} strings, got {}", n, params)))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| MissionError::invalid_params(kind, format!("expected a string, got {}", item)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_kinds_are_registered() {
        let registry = ActionRegistry::with_builtin_handlers();
        assert_eq!(
            registry.available_actions(),
            vec![
                "cancel",
                "conditional",
                "delay",
                "missionFailed",
                "missionSucceeded",
                "schedule",
                "send",
                "sharescannedcreds",
            ]
        );
    }

    #[test]
    fn param_shapes() {
        assert_eq!(single_string("schedule", &json!("a")).unwrap(), "a");
        assert_eq!(single_string("schedule", &json!(["a"])).unwrap(), "a");
        assert!(single_string("schedule", &json!(["a", "b"])).is_err());
        assert!(single_string("schedule", &json!(3)).is_err());

        assert_eq!(single_number("delay", &json!(1000)).unwrap(), 1000);
        assert_eq!(single_number("delay", &json!([250])).unwrap(), 250);
        assert!(single_number("delay", &json!(-1)).is_err());
        assert!(single_number("delay", &json!("soon")).is_err());

        assert_eq!(string_list("send", &json!(["a", "b"]), 2).unwrap(), vec!["a", "b"]);
        assert!(string_list("send", &json!(["a"]), 2).is_err());

        assert_eq!(optional_string("missionFailed", &json!(null)).unwrap(), None);
        assert_eq!(optional_string("missionFailed", &json!(["why"])).unwrap(), Some("why"));
    }
}
