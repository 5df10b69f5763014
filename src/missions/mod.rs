//! Mission orchestration engine.
//!
//! Templates are loaded into a [`TemplateRegistry`]. The [`MissionManager`]
//! gates them through the unlock and statistics ledgers and starts
//! [`Mission`] instances. Each mission arms named events on its own
//! [`MissionEventScheduler`]; completed events hand action lists to the
//! [`ActionRegistry`]. The [`AutoScheduler`] polls the manager and starts
//! missions without operator input.

pub mod actions;
pub mod auto_scheduler;
pub mod channel;
pub mod condition;
pub mod errors;
pub mod event_scheduler;
pub mod factory;
pub mod loader;
pub mod manager;
pub mod mission;
pub mod registry;
pub mod statistics;
pub mod types;
pub mod unlocker;
pub mod validate;
pub mod variables;

pub use actions::{ActionHandler, ActionRegistry};
pub use auto_scheduler::{AutoScheduler, AutoSchedulerHandle, AutoSchedulerStats, SchedulerConfig};
pub use channel::{EventChannel, ListenerId};
pub use condition::{Condition, Value};
pub use errors::{MissionError, Result};
pub use event_scheduler::{EventSink, MissionEventScheduler};
pub use factory::{DeclarativeSetup, FnFactory, MissionFactory, StaticVariables};
pub use loader::{load_templates_from_json, templates_from_str};
pub use manager::{Eligibility, MissionManager, MissionStatus};
pub use mission::{Mission, MissionContext};
pub use registry::TemplateRegistry;
pub use statistics::{Clock, ManualClock, StatisticsLedger, SystemClock, TemplateStats};
pub use types::{
    Action, ActionBlock, EventOutcome, EventStatus, MissionEvent, MissionId, MissionTemplate, Reward, Subscription,
    TemplateId, TimeoutConfig, TriggerConfig, Variables,
};
pub use unlocker::UnlockLedger;
pub use validate::{validate_template, ContentIssue};
pub use variables::replace_template_variables;
