use thiserror::Error;

use super::manager::Eligibility;
use super::types::{MissionId, TemplateId};

/// Errors raised by the mission engine.
///
/// Everything here is fatal for the operation that produced it. Content-level
/// failures that must not take the engine down (condition evaluation inside a
/// trigger callback, errors inside a spawned action sequence) are logged at the
/// point where they occur instead of being surfaced through this type.
#[derive(Debug, Error)]
pub enum MissionError {
    /// An event name was scheduled while an earlier arming is still pending.
    #[error("event '{0}' is already scheduled")]
    DuplicateEvent(String),

    /// Cancel was requested for an event that is not currently pending.
    #[error("event '{0}' is not pending")]
    EventNotPending(String),

    /// The template has no event with this name in its `events` map.
    #[error("template '{template}' has no event named '{event}'")]
    UnknownEvent { template: TemplateId, event: String },

    /// No template with this id was loaded into the registry.
    #[error("unknown mission template '{0}'")]
    UnknownTemplate(TemplateId),

    /// No handler is registered for the action kind.
    #[error("unknown action type '{0}'")]
    UnknownAction(String),

    /// Action parameters do not have the shape the handler expects.
    #[error("invalid parameters for '{action}': {reason}")]
    InvalidParams { action: String, reason: String },

    /// A trigger or conditional addressed a service that does not exist.
    #[error("service '{service}' not found on {host}")]
    ServiceNotFound { host: String, service: String },

    /// The host directory has no host with this name.
    #[error("host '{0}' not found")]
    HostNotFound(String),

    /// A host with this name already exists in the host directory.
    #[error("host '{0}' already exists")]
    DuplicateHost(String),

    /// The resolved service has no method or event channel with this name.
    #[error("service '{service}' has no method '{method}'")]
    MethodNotFound { service: String, method: String },

    /// `start_mission` was called without `force` for a template that fails a gate.
    #[error("mission '{template}' is not eligible to start ({eligibility})")]
    IneligibleMission {
        template: TemplateId,
        eligibility: Eligibility,
    },

    /// Mission creation could not find the data it needs (e.g. no contact with a tag).
    #[error("mission setup failed: {0}")]
    MissionSetup(String),

    /// A terminal transition was requested for a mission that is not active.
    #[error("mission '{0}' is not active")]
    MissionNotActive(MissionId),

    /// A condition failed to parse or evaluate.
    #[error("condition error: {0}")]
    Condition(String),

    /// A collaborator service rejected a call.
    #[error("service call failed: {0}")]
    Service(String),

    /// Timers and action tasks need a Tokio runtime to be running.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// Wrapper around IO errors while loading content.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around JSON errors while loading content.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MissionError {
    pub(crate) fn invalid_params(action: &str, reason: impl Into<String>) -> Self {
        MissionError::InvalidParams {
            action: action.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MissionError>;
