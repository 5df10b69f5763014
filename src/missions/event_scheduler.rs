//! Per-mission event arming: immediate actions, triggers, timeouts, and the race between them.
//!
//! Each named event goes `Pending -> Instant | Triggered | Timedout | Cancelled`.
//! A race event (trigger and/or timeout) keeps one pending entry holding the
//! listener registration and the timer task. Whichever side completes first
//! removes that entry under the state lock, so the other side finds nothing to
//! complete. Every arming gets a fresh generation number that its listener and
//! timer carry; a callback from an earlier arming of the same name is ignored.
//!
//! The scheduler never runs actions itself. An instant event's list goes back
//! to whoever armed it, so an action sequence can run it before its next
//! action. Trigger and timeout lists are handed to an [`EventSink`] (the owning
//! mission), which runs them on their own task.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::channel::{DynChannel, ListenerId};
use super::condition::{Condition, Value};
use super::errors::{MissionError, Result};
use super::types::{Action, EventOutcome, EventStatus, MissionEvent, Variables};
use super::variables::replace_template_variables;
use crate::logutil::escape_log;
use crate::services::Environment;

/// Receiver of action lists produced by completed events.
pub trait EventSink: Send + Sync {
    fn dispatch(self: Arc<Self>, event: &str, actions: Vec<Action>);
}

struct PendingEvent {
    generation: u64,
    config: MissionEvent,
    listener: Option<(Arc<dyn DynChannel>, ListenerId)>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct SchedulerState {
    next_generation: u64,
    pending: BTreeMap<String, PendingEvent>,
    history: Vec<(String, EventOutcome)>,
}

struct Inner {
    label: String,
    sink: Weak<dyn EventSink>,
    state: Mutex<SchedulerState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(&self, event: &str, actions: Vec<Action>) {
        if actions.is_empty() {
            return;
        }
        match self.sink.upgrade() {
            Some(sink) => sink.dispatch(event, actions),
            None => debug!("[{}] event '{}' completed after its mission was dropped", self.label, event),
        }
    }

    /// Finish the arming `generation` of `event` with a trigger or timeout outcome.
    fn complete(&self, event: &str, generation: u64, status: EventStatus, trigger_args: Option<Vec<Value>>) {
        let entry = {
            let mut state = self.lock();
            match state.pending.get(event) {
                Some(p) if p.generation == generation => {}
                _ => return,
            }
            let Some(entry) = state.pending.remove(event) else {
                return;
            };
            state.history.push((
                event.to_string(),
                EventOutcome {
                    status,
                    timestamp: Utc::now(),
                    original_config: entry.config.clone(),
                    trigger_args,
                },
            ));
            entry
        };

        if let Some((channel, id)) = &entry.listener {
            channel.unsubscribe(*id);
        }
        if status != EventStatus::Timedout {
            if let Some(timer) = &entry.timer {
                timer.abort();
            }
        }

        info!("[{}] event '{}' {}", self.label, event, status);
        let actions = match status {
            EventStatus::Triggered => entry.config.trigger.map(|t| t.on_trigger.actions),
            EventStatus::Timedout => entry.config.timeout.map(|t| t.on_timeout.actions),
            _ => None,
        };
        self.dispatch(event, actions.unwrap_or_default());
    }
}

/// Arms and tracks the events of one mission.
pub struct MissionEventScheduler {
    inner: Arc<Inner>,
    variables: Variables,
    env: Environment,
    runtime: Handle,
}

impl MissionEventScheduler {
    pub fn new(
        label: impl Into<String>,
        variables: Variables,
        env: Environment,
        sink: Weak<dyn EventSink>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                sink,
                state: Mutex::new(SchedulerState::default()),
            }),
            variables,
            env,
            runtime,
        }
    }

    /// Arm every event of `events` in key order, stopping at the first error.
    /// Instant lists go to the sink.
    pub fn schedule_events_for_mission(&self, events: &BTreeMap<String, MissionEvent>) -> Result<()> {
        for (name, config) in events {
            if let Some(actions) = self.schedule_single_event(name, config)? {
                self.inner.dispatch(name, actions);
            }
        }
        Ok(())
    }

    /// Arm one event. An event with neither trigger nor timeout is recorded
    /// `Instant` and its action list is returned for the caller to run.
    pub fn schedule_single_event(&self, name: &str, config: &MissionEvent) -> Result<Option<Vec<Action>>> {
        let mut state = self.inner.lock();
        if state.pending.contains_key(name) {
            return Err(MissionError::DuplicateEvent(name.to_string()));
        }

        if !config.is_race() {
            state.history.push((
                name.to_string(),
                EventOutcome {
                    status: EventStatus::Instant,
                    timestamp: Utc::now(),
                    original_config: config.clone(),
                    trigger_args: None,
                },
            ));
            drop(state);
            debug!("[{}] event '{}' instant", self.inner.label, name);
            return Ok(Some(config.actions.clone().unwrap_or_default()));
        }

        if config.actions.as_ref().is_some_and(|a| !a.is_empty()) {
            warn!(
                "[{}] event '{}' has a trigger or timeout; its top-level actions are ignored",
                self.inner.label, name
            );
        }

        state.next_generation += 1;
        let generation = state.next_generation;

        let listener = match &config.trigger {
            Some(trigger) => Some(self.arm_trigger(name, generation, &trigger.subscribe)?),
            None => None,
        };
        let timer = config
            .timeout
            .as_ref()
            .map(|timeout| self.arm_timeout(name, generation, timeout.delay));

        debug!("[{}] event '{}' pending (generation {})", self.inner.label, name, generation);
        state.pending.insert(
            name.to_string(),
            PendingEvent {
                generation,
                config: config.clone(),
                listener,
                timer,
            },
        );
        Ok(None)
    }

    fn arm_trigger(
        &self,
        name: &str,
        generation: u64,
        subscribe: &super::types::Subscription,
    ) -> Result<(Arc<dyn DynChannel>, ListenerId)> {
        let host = subscribe
            .registry_name
            .as_deref()
            .map(|h| replace_template_variables(h, &self.variables));
        let target = replace_template_variables(&subscribe.target, &self.variables);
        let service = self.env.resolve_service(host.as_deref(), &target)?;
        let channel = service
            .channel(&subscribe.method)
            .ok_or_else(|| MissionError::MethodNotFound {
                service: target.clone(),
                method: subscribe.method.clone(),
            })?;

        let source = replace_template_variables(&subscribe.condition, &self.variables);
        let condition = Condition::compile(&subscribe.condition_args, &source)?;

        let weak = Arc::downgrade(&self.inner);
        let event = name.to_string();
        let id = channel.subscribe_args(Arc::new(move |args: &[Value]| {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            match condition.evaluate_args(args) {
                Ok(true) => {
                    let bound = args.iter().take(condition.arity()).cloned().collect();
                    inner.complete(&event, generation, EventStatus::Triggered, Some(bound));
                }
                Ok(false) => {}
                Err(e) => warn!(
                    "[{}] condition for '{}' failed: {} (source: {})",
                    inner.label,
                    event,
                    e,
                    escape_log(condition.source())
                ),
            }
            Ok(())
        }));
        debug!(
            "[{}] event '{}' listening on {}.{}",
            self.inner.label,
            name,
            target,
            channel.channel_name()
        );
        Ok((channel, id))
    }

    fn arm_timeout(&self, name: &str, generation: u64, delay_ms: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let event = name.to_string();
        self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let Some(inner) = weak.upgrade() {
                inner.complete(&event, generation, EventStatus::Timedout, None);
            }
        })
    }

    /// Disarm a pending event without running either side. Fails if it is not pending.
    pub fn cancel_event(&self, name: &str) -> Result<()> {
        let entry = {
            let mut state = self.inner.lock();
            let entry = state
                .pending
                .remove(name)
                .ok_or_else(|| MissionError::EventNotPending(name.to_string()))?;
            state.history.push((
                name.to_string(),
                EventOutcome {
                    status: EventStatus::Cancelled,
                    timestamp: Utc::now(),
                    original_config: entry.config.clone(),
                    trigger_args: None,
                },
            ));
            entry
        };
        Self::disarm(&entry);
        info!("[{}] event '{}' cancelled", self.inner.label, name);
        Ok(())
    }

    /// Cancel every pending event. Returns the names that were cancelled.
    pub fn disarm_all(&self) -> Vec<String> {
        let drained: Vec<(String, PendingEvent)> = {
            let mut state = self.inner.lock();
            let drained: Vec<_> = std::mem::take(&mut state.pending).into_iter().collect();
            let now = Utc::now();
            for (name, entry) in &drained {
                state.history.push((
                    name.clone(),
                    EventOutcome {
                        status: EventStatus::Cancelled,
                        timestamp: now,
                        original_config: entry.config.clone(),
                        trigger_args: None,
                    },
                ));
            }
            drained
        };
        for (_, entry) in &drained {
            Self::disarm(entry);
        }
        if !drained.is_empty() {
            debug!("[{}] disarmed {} pending events", self.inner.label, drained.len());
        }
        drained.into_iter().map(|(name, _)| name).collect()
    }

    fn disarm(entry: &PendingEvent) {
        if let Some((channel, id)) = &entry.listener {
            channel.unsubscribe(*id);
        }
        if let Some(timer) = &entry.timer {
            timer.abort();
        }
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.inner.lock().pending.contains_key(name)
    }

    pub fn active_event_names(&self) -> Vec<String> {
        self.inner.lock().pending.keys().cloned().collect()
    }

    /// Latest outcome recorded for `name`.
    pub fn outcome(&self, name: &str) -> Option<EventOutcome> {
        self.inner
            .lock()
            .history
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, o)| o.clone())
    }

    /// Every outcome in the order it was recorded.
    pub fn history(&self) -> Vec<(String, EventOutcome)> {
        self.inner.lock().history.clone()
    }
}

impl Drop for MissionEventScheduler {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::missions::types::{ActionBlock, Subscription, TimeoutConfig, TriggerConfig};

    #[derive(Default)]
    struct RecordingSink {
        fired: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl EventSink for RecordingSink {
        fn dispatch(self: Arc<Self>, event: &str, actions: Vec<Action>) {
            self.fired
                .lock()
                .unwrap()
                .push((event.to_string(), actions.into_iter().map(|a| a.kind).collect()));
        }
    }

    impl RecordingSink {
        fn fired(&self) -> Vec<(String, Vec<String>)> {
            self.fired.lock().unwrap().clone()
        }
    }

    fn scheduler(env: &Environment, sink: &Arc<RecordingSink>) -> MissionEventScheduler {
        let vars = Variables::from([("momUserID".to_string(), "players.mom".to_string())]);
        let weak: Weak<dyn EventSink> = Arc::downgrade(sink) as Weak<dyn EventSink>;
        MissionEventScheduler::new("mission_test", vars, env.clone(), weak, Handle::current())
    }

    fn action(kind: &str) -> Action {
        Action::new(kind, serde_json::json!([]))
    }

    fn chat_trigger(condition: &str, actions: Vec<Action>) -> TriggerConfig {
        TriggerConfig {
            subscribe: Subscription {
                registry_name: None,
                target: "service.chat".into(),
                method: "onMessageSentTo".into(),
                condition_args: "toId, message".into(),
                condition: condition.into(),
            },
            on_trigger: ActionBlock { actions },
        }
    }

    fn race(trigger: Option<TriggerConfig>, timeout: Option<(u64, Vec<Action>)>) -> MissionEvent {
        MissionEvent {
            actions: None,
            trigger,
            timeout: timeout.map(|(delay, actions)| TimeoutConfig {
                delay,
                on_timeout: ActionBlock { actions },
            }),
        }
    }

    #[tokio::test]
    async fn actions_only_event_is_instant_and_arms_nothing() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);

        let instant = s
            .schedule_single_event("start", &MissionEvent::immediate(vec![action("send")]))
            .unwrap()
            .expect("instant actions");

        assert_eq!(instant.len(), 1);
        assert_eq!(instant[0].kind, "send");
        assert_eq!(s.outcome("start").unwrap().status, EventStatus::Instant);
        assert!(s.active_event_names().is_empty());
        assert_eq!(env.chat.on_message_sent_to().listener_count(), 0);
        assert!(sink.fired().is_empty());
    }

    #[tokio::test]
    async fn initial_instant_events_go_to_the_sink() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        let events = BTreeMap::from([
            ("b_wait".to_string(), race(Some(chat_trigger("true", vec![])), None)),
            ("a_start".to_string(), MissionEvent::immediate(vec![action("send")])),
        ]);

        s.schedule_events_for_mission(&events).unwrap();
        assert_eq!(sink.fired(), vec![("a_start".to_string(), vec!["send".to_string()])]);
        assert_eq!(s.active_event_names(), vec!["b_wait".to_string()]);
    }

    #[tokio::test]
    async fn empty_event_is_recorded_instant() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        assert_eq!(
            s.schedule_single_event("noop", &MissionEvent::default()).unwrap(),
            Some(vec![])
        );
        assert_eq!(s.outcome("noop").unwrap().status, EventStatus::Instant);
        assert!(sink.fired().is_empty());
    }

    #[tokio::test]
    async fn trigger_fires_once_with_substituted_condition() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        let cond = "toId == '{{momUserID}}' && contains_any(message.content, 'how', 'where')";
        s.schedule_single_event("hint", &race(Some(chat_trigger(cond, vec![action("send")])), None))
            .unwrap();
        assert!(s.is_pending("hint"));

        env.chat.add_message_to("players.dad", "how do I fix it");
        env.chat.add_message_to("players.mom", "thanks");
        assert!(sink.fired().is_empty());

        env.chat.add_message_to("players.mom", "Where is the router?");
        env.chat.add_message_to("players.mom", "how?");

        assert_eq!(sink.fired().len(), 1);
        let outcome = s.outcome("hint").unwrap();
        assert_eq!(outcome.status, EventStatus::Triggered);
        assert_eq!(outcome.trigger_args.unwrap()[0], Value::from("players.mom"));
        assert_eq!(env.chat.on_message_sent_to().listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_first_removes_the_listener() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        let event = race(
            Some(chat_trigger("toId == '{{momUserID}}'", vec![action("send")])),
            Some((1000, vec![action("missionFailed")])),
        );
        s.schedule_single_event("race", &event).unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(s.outcome("race").unwrap().status, EventStatus::Timedout);
        assert_eq!(env.chat.on_message_sent_to().listener_count(), 0);

        env.chat.add_message_to("players.mom", "hello");
        assert_eq!(
            sink.fired(),
            vec![("race".to_string(), vec!["missionFailed".to_string()])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_first_aborts_the_timer() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        let event = race(
            Some(chat_trigger("true", vec![action("send")])),
            Some((1000, vec![action("missionFailed")])),
        );
        s.schedule_single_event("race", &event).unwrap();
        env.chat.add_message_to("anyone", "x");

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(s.outcome("race").unwrap().status, EventStatus::Triggered);
        assert_eq!(sink.fired().len(), 1);
        assert_eq!(s.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms_both_sides() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        let event = race(
            Some(chat_trigger("true", vec![action("send")])),
            Some((500, vec![action("missionFailed")])),
        );
        s.schedule_single_event("race", &event).unwrap();
        s.cancel_event("race").unwrap();

        env.chat.add_message_to("players.mom", "x");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(sink.fired().is_empty());
        assert_eq!(s.outcome("race").unwrap().status, EventStatus::Cancelled);
        assert!(matches!(s.cancel_event("race"), Err(MissionError::EventNotPending(_))));
    }

    #[tokio::test]
    async fn duplicate_pending_event_is_rejected_but_rearming_is_allowed() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        let event = race(Some(chat_trigger("true", vec![])), None);

        s.schedule_single_event("wait", &event).unwrap();
        assert!(matches!(
            s.schedule_single_event("wait", &event),
            Err(MissionError::DuplicateEvent(_))
        ));

        env.chat.add_message_to("x", "y");
        s.schedule_single_event("wait", &event).unwrap();
        env.chat.add_message_to("x", "y");

        let statuses: Vec<_> = s.history().into_iter().map(|(_, o)| o.status).collect();
        assert_eq!(statuses, vec![EventStatus::Triggered, EventStatus::Triggered]);
        assert_eq!(env.chat.on_message_sent_to().listener_count(), 0);
    }

    #[tokio::test]
    async fn unresolvable_targets_fail_fast() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);

        let mut bad_target = chat_trigger("true", vec![]);
        bad_target.subscribe.target = "service.nothing".into();
        assert!(matches!(
            s.schedule_single_event("a", &race(Some(bad_target), None)),
            Err(MissionError::ServiceNotFound { .. })
        ));

        let mut bad_method = chat_trigger("true", vec![]);
        bad_method.subscribe.method = "onTeleport".into();
        assert!(matches!(
            s.schedule_single_event("b", &race(Some(bad_method), None)),
            Err(MissionError::MethodNotFound { .. })
        ));

        let mut bad_host = chat_trigger("true", vec![]);
        bad_host.subscribe.registry_name = Some("ghost.home".into());
        assert!(matches!(
            s.schedule_single_event("c", &race(Some(bad_host), None)),
            Err(MissionError::HostNotFound(_))
        ));

        assert!(s.active_event_names().is_empty());
    }

    #[tokio::test]
    async fn condition_errors_are_logged_not_fatal() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        s.schedule_single_event("e", &race(Some(chat_trigger("missing.field == 1", vec![])), None))
            .unwrap();
        env.chat.add_message_to("x", "y");
        assert!(s.is_pending("e"));
    }

    #[tokio::test]
    async fn disarm_all_cancels_everything() {
        let env = Environment::new();
        let sink = Arc::new(RecordingSink::default());
        let s = scheduler(&env, &sink);
        s.schedule_single_event("a", &race(Some(chat_trigger("true", vec![])), None)).unwrap();
        s.schedule_single_event("b", &race(None, Some((10_000, vec![])))).unwrap();

        assert_eq!(s.disarm_all(), vec!["a".to_string(), "b".to_string()]);
        assert!(s.active_event_names().is_empty());
        assert_eq!(env.chat.on_message_sent_to().listener_count(), 0);
        assert_eq!(s.outcome("b").unwrap().status, EventStatus::Cancelled);
    }
}
