//! One running instance of a mission template.
//!
//! A [`Mission`] owns its variable bindings and a [`MissionEventScheduler`].
//! Trigger and timeout action lists run on their own Tokio task, one action at
//! a time. An instant event armed by a `schedule` action runs inline, before
//! the next action of the sequence that armed it. Before each action the mission checks that it is still
//! active; the terminal actions clear that flag through the manager, which is
//! how `missionSucceeded`/`missionFailed` stop the rest of a sequence.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, error, warn};
use tokio::runtime::Handle;

use super::actions::ActionRegistry;
use super::errors::{MissionError, Result};
use super::event_scheduler::{EventSink, MissionEventScheduler};
use super::manager::MissionManager;
use super::types::{Action, EventOutcome, EventStatus, MissionId, MissionTemplate, Variables};
use super::variables::replace_template_variables;
use crate::services::Environment;

pub type ActionsFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

pub struct Mission {
    id: MissionId,
    template: Arc<MissionTemplate>,
    variables: Variables,
    scheduler: MissionEventScheduler,
    active: AtomicBool,
    actions: Arc<ActionRegistry>,
    env: Environment,
    manager: Weak<MissionManager>,
    runtime: Handle,
}

impl Mission {
    /// Build a mission. Must be called from within a Tokio runtime.
    pub fn new(
        id: MissionId,
        template: Arc<MissionTemplate>,
        variables: Variables,
        env: Environment,
        actions: Arc<ActionRegistry>,
        manager: Weak<MissionManager>,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| MissionError::NoRuntime)?;
        Ok(Arc::new_cyclic(|me: &Weak<Mission>| {
            let sink: Weak<dyn EventSink> = me.clone();
            Mission {
                scheduler: MissionEventScheduler::new(
                    id.to_string(),
                    variables.clone(),
                    env.clone(),
                    sink,
                    runtime.clone(),
                ),
                id,
                template,
                variables,
                active: AtomicBool::new(true),
                actions,
                env,
                manager,
                runtime,
            }
        }))
    }

    pub fn id(&self) -> &MissionId {
        &self.id
    }

    pub fn template(&self) -> &Arc<MissionTemplate> {
        &self.template
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Claim the terminal transition. Only the first caller gets `true`.
    pub(crate) fn deactivate(&self) -> bool {
        self.active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Arm every initial event.
    pub fn start(&self) -> Result<()> {
        debug!(
            "[{}] starting '{}' with {} initial events",
            self.id,
            self.template.id,
            self.template.events_initial.len()
        );
        self.scheduler
            .schedule_events_for_mission(&self.template.events_initial)
    }

    /// Arm a named event from the template's `events` map. An instant event's
    /// actions are started on their own task.
    pub fn schedule_event(self: &Arc<Self>, name: &str) -> Result<()> {
        if let Some(actions) = self.arm_event(name)? {
            if !actions.is_empty() {
                self.clone().spawn_actions(name.to_string(), actions);
            }
        }
        Ok(())
    }

    /// Arm a named event and hand back the actions of an instant one.
    fn arm_event(&self, name: &str) -> Result<Option<Vec<Action>>> {
        let config = self
            .template
            .events
            .get(name)
            .ok_or_else(|| MissionError::UnknownEvent {
                template: self.template.id.clone(),
                event: name.to_string(),
            })?;
        self.scheduler.schedule_single_event(name, config)
    }

    pub fn cancel_event(&self, name: &str) -> Result<()> {
        self.scheduler.cancel_event(name)
    }

    /// Cancel every pending event. Used when the mission leaves the active set.
    pub(crate) fn disarm(&self) -> Vec<String> {
        self.scheduler.disarm_all()
    }

    pub fn scheduler(&self) -> &MissionEventScheduler {
        &self.scheduler
    }

    /// Pending events first, then every recorded outcome in order.
    pub fn event_statuses(&self) -> Vec<(String, EventStatus)> {
        let mut statuses: Vec<(String, EventStatus)> = self
            .scheduler
            .active_event_names()
            .into_iter()
            .map(|name| (name, EventStatus::Pending))
            .collect();
        statuses.extend(
            self.scheduler
                .history()
                .into_iter()
                .map(|(name, outcome)| (name, outcome.status)),
        );
        statuses
    }

    pub fn event_history(&self) -> Vec<(String, EventOutcome)> {
        self.scheduler.history()
    }

    /// Run `actions` in order, stopping early once the mission is no longer active.
    pub fn execute_actions(self: Arc<Self>, actions: Vec<Action>) -> ActionsFuture {
        Box::pin(async move {
            let ctx = MissionContext {
                mission: self.clone(),
            };
            for action in actions {
                if !self.is_active() {
                    debug!("[{}] inactive, skipping remaining actions", self.id);
                    break;
                }
                self.actions
                    .execute_action(&action.kind, &action.params, &ctx)
                    .await?;
            }
            Ok(())
        })
    }

    fn spawn_actions(self: Arc<Self>, event: String, actions: Vec<Action>) {
        let runtime = self.runtime.clone();
        runtime.spawn(async move {
            let id = self.id.clone();
            if let Err(e) = self.execute_actions(actions).await {
                error!("[{}] actions of event '{}' failed: {}", id, event, e);
            }
        });
    }
}

impl EventSink for Mission {
    fn dispatch(self: Arc<Self>, event: &str, actions: Vec<Action>) {
        if !self.is_active() {
            warn!("[{}] event '{}' completed on an inactive mission", self.id, event);
            return;
        }
        self.spawn_actions(event.to_string(), actions);
    }
}

/// What an action handler may see and do.
pub struct MissionContext {
    mission: Arc<Mission>,
}

impl MissionContext {
    pub fn mission_id(&self) -> &MissionId {
        &self.mission.id
    }

    pub fn template(&self) -> &MissionTemplate {
        &self.mission.template
    }

    pub fn variables(&self) -> &Variables {
        &self.mission.variables
    }

    pub fn substitute(&self, text: &str) -> String {
        replace_template_variables(text, &self.mission.variables)
    }

    pub fn environment(&self) -> &Environment {
        &self.mission.env
    }

    pub fn is_active(&self) -> bool {
        self.mission.is_active()
    }

    /// Arm a named event. An instant event runs to completion before this returns.
    pub async fn schedule_event(&self, name: &str) -> Result<()> {
        match self.mission.arm_event(name)? {
            Some(actions) => self.execute_additional_actions(actions).await,
            None => Ok(()),
        }
    }

    pub fn cancel_event(&self, name: &str) -> Result<()> {
        self.mission.cancel_event(name)
    }

    /// Run a nested action list inline, e.g. a conditional branch.
    pub async fn execute_additional_actions(&self, actions: Vec<Action>) -> Result<()> {
        self.mission.clone().execute_actions(actions).await
    }

    pub fn succeed(&self, message: &str) -> Result<()> {
        match self.mission.manager.upgrade() {
            Some(manager) => manager.end_mission_success(&self.mission.id).map(|_| ()),
            None => self.orphaned("success", message),
        }
    }

    pub fn fail(&self, message: &str) -> Result<()> {
        match self.mission.manager.upgrade() {
            Some(manager) => manager.end_mission_failure(&self.mission.id).map(|_| ()),
            None => self.orphaned("failure", message),
        }
    }

    fn orphaned(&self, outcome: &str, message: &str) -> Result<()> {
        warn!(
            "[{}] {} ({}) reported after the manager was dropped",
            self.mission.id, outcome, message
        );
        self.mission.deactivate();
        self.mission.disarm();
        Ok(())
    }
}
