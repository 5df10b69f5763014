//! Mission lifecycle: eligibility, start, success, failure, rewards.
//!
//! The manager owns the unlock ledger, the statistics ledger and the set of
//! active missions. All three sit behind their own mutex and are only changed
//! here, at start and at the terminal transition. A mission leaves the active
//! set exactly once: the first `end_mission_*` (or `cancel_mission`) call
//! claims it, any later call for the same id gets
//! [`MissionError::MissionNotActive`] and changes nothing.
//!
//! Eligibility is five independent predicates, all of which must hold:
//!
//! 1. unlocked: no `blockedBy` key is set and every `blockedUntil` key is set
//! 2. resource met: reputation reaches `requiresMinReputation`
//! 3. parallelizable: fewer active instances than `maxConcurrentInstances`
//! 4. rerunnable: fewer successes than `maxSuccessCompletions`
//! 5. waited enough: the later of last start and last end, plus
//!    `minSecondsBeforeRetryAfterFailure`, lies strictly in the past

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::actions::ActionRegistry;
use super::errors::{MissionError, Result};
use super::mission::Mission;
use super::registry::TemplateRegistry;
use super::statistics::{has_elapsed, Clock, StatisticsLedger, TemplateStats};
use super::types::{EventStatus, MissionId, MissionTemplate, TemplateId, Variables};
use super::unlocker::UnlockLedger;
use crate::services::Environment;

/// Result of every eligibility predicate for one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub unlocked: bool,
    pub resource_met: bool,
    pub parallelizable: bool,
    pub rerunnable: bool,
    pub waited_enough: bool,
}

impl Eligibility {
    pub fn can_start(&self) -> bool {
        self.unlocked && self.resource_met && self.parallelizable && self.rerunnable && self.waited_enough
    }

    /// Names of the predicates that do not hold.
    pub fn failing(&self) -> Vec<&'static str> {
        [
            (self.unlocked, "unlocked"),
            (self.resource_met, "resource"),
            (self.parallelizable, "parallel"),
            (self.rerunnable, "rerun"),
            (self.waited_enough, "cooldown"),
        ]
        .into_iter()
        .filter(|(ok, _)| !ok)
        .map(|(_, name)| name)
        .collect()
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.can_start() {
            f.write_str("eligible")
        } else {
            write!(f, "failed: {}", self.failing().join(", "))
        }
    }
}

/// Debug view of one active mission.
#[derive(Debug, Clone, Serialize)]
pub struct MissionStatus {
    pub id: MissionId,
    pub template_id: TemplateId,
    pub title: String,
    pub variables: Variables,
    pub events: Vec<(String, EventStatus)>,
}

impl MissionStatus {
    fn of(mission: &Mission) -> Self {
        Self {
            id: mission.id().clone(),
            template_id: mission.template().id.clone(),
            title: mission.template().title.clone(),
            variables: mission.variables().clone(),
            events: mission.event_statuses(),
        }
    }
}

pub struct MissionManager {
    registry: TemplateRegistry,
    env: Environment,
    actions: Arc<ActionRegistry>,
    clock: Arc<dyn Clock>,
    unlocks: Mutex<UnlockLedger>,
    statistics: Mutex<StatisticsLedger>,
    missions: Mutex<BTreeMap<MissionId, Arc<Mission>>>,
    next_mission: AtomicU64,
    me: Weak<MissionManager>,
}

impl MissionManager {
    pub fn new(
        registry: TemplateRegistry,
        env: Environment,
        actions: Arc<ActionRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| MissionManager {
            registry,
            env,
            actions,
            clock,
            unlocks: Mutex::new(UnlockLedger::new()),
            statistics: Mutex::new(StatisticsLedger::new()),
            missions: Mutex::new(BTreeMap::new()),
            next_mission: AtomicU64::new(1),
            me: me.clone(),
        })
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn action_registry(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn missions(&self) -> MutexGuard<'_, BTreeMap<MissionId, Arc<Mission>>> {
        self.missions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unlocks(&self) -> MutexGuard<'_, UnlockLedger> {
        self.unlocks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats(&self) -> MutexGuard<'_, StatisticsLedger> {
        self.statistics.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ----- templates -----

    pub fn all_templates(&self) -> Vec<Arc<MissionTemplate>> {
        self.registry.get_mission_templates()
    }

    pub fn template(&self, id: &TemplateId) -> Option<Arc<MissionTemplate>> {
        self.registry.get_mission_template(id)
    }

    pub fn eligible_templates(&self) -> Vec<Arc<MissionTemplate>> {
        self.all_templates()
            .into_iter()
            .filter(|t| self.can_start_mission(t))
            .collect()
    }

    // ----- eligibility -----

    pub fn is_mission_unlocked(&self, template: &MissionTemplate) -> bool {
        let unlocks = self.unlocks();
        !unlocks.are_any_keys_locked(&template.blocked_by) && unlocks.are_all_keys_unlocked(&template.blocked_until)
    }

    pub fn is_mission_resource_met(&self, template: &MissionTemplate) -> bool {
        template
            .requires_min_reputation
            .map_or(true, |min| self.env.reputation.reputation() >= min)
    }

    pub fn is_mission_parallelizable(&self, template: &MissionTemplate) -> bool {
        template
            .max_concurrent_instances
            .map_or(true, |max| self.active_instances_of(&template.id) < max)
    }

    pub fn is_mission_rerunnable(&self, template: &MissionTemplate) -> bool {
        template
            .max_success_completions
            .map_or(true, |max| self.stats().success_count(&template.id) < max)
    }

    pub fn has_mission_waited_enough_between_retries(&self, template: &MissionTemplate) -> bool {
        let Some(cooldown) = template.min_seconds_before_retry_after_failure else {
            return true;
        };
        let last_attempt = {
            let stats = self.stats();
            stats
                .last_attempt_start_time(&template.id)
                .max(stats.last_attempt_end_time(&template.id))
        };
        match last_attempt {
            None => true,
            Some(last) => has_elapsed(last, cooldown, self.now()),
        }
    }

    pub fn eligibility(&self, template: &MissionTemplate) -> Eligibility {
        Eligibility {
            unlocked: self.is_mission_unlocked(template),
            resource_met: self.is_mission_resource_met(template),
            parallelizable: self.is_mission_parallelizable(template),
            rerunnable: self.is_mission_rerunnable(template),
            waited_enough: self.has_mission_waited_enough_between_retries(template),
        }
    }

    pub fn can_start_mission(&self, template: &MissionTemplate) -> bool {
        self.eligibility(template).can_start()
    }

    // ----- lifecycle -----

    /// Start a mission from `template_id`. `force` skips the eligibility check.
    pub fn start_mission(&self, template_id: &TemplateId, force: bool) -> Result<MissionId> {
        let template = self
            .template(template_id)
            .ok_or_else(|| MissionError::UnknownTemplate(template_id.clone()))?;

        if !force {
            let eligibility = self.eligibility(&template);
            if !eligibility.can_start() {
                return Err(MissionError::IneligibleMission {
                    template: template.id.clone(),
                    eligibility,
                });
            }
        }

        let variables = template.factory.create_mission(&self.env)?;
        let id = MissionId::from_sequence(self.next_mission.fetch_add(1, Ordering::SeqCst));
        let mission = Mission::new(
            id.clone(),
            template.clone(),
            variables,
            self.env.clone(),
            self.actions.clone(),
            self.me.clone(),
        )?;

        self.missions().insert(id.clone(), mission.clone());
        self.stats().record_start(&template.id, self.now());
        info!("[{}] started '{}' ({})", id, template.id, template.title);

        if let Err(e) = mission.start() {
            warn!("[{}] failed to arm initial events: {}", id, e);
            if mission.deactivate() {
                mission.disarm();
                self.missions().remove(&id);
                self.stats().record_failure(&template.id, self.now());
            }
            return Err(e);
        }
        Ok(id)
    }

    /// Take `id` out of the active set. Only the first caller for an id succeeds.
    fn claim(&self, id: &MissionId) -> Result<Arc<Mission>> {
        let mut missions = self.missions();
        match missions.get(id) {
            Some(mission) if mission.deactivate() => {
                let mission = mission.clone();
                missions.remove(id);
                Ok(mission)
            }
            _ => Err(MissionError::MissionNotActive(id.clone())),
        }
    }

    /// Record success, apply unlocks, locks and rewards, then retire the mission.
    pub fn end_mission_success(&self, id: &MissionId) -> Result<TemplateId> {
        let mission = self.claim(id)?;
        let template = mission.template().clone();

        self.stats().record_success(&template.id, self.now());
        {
            let mut unlocks = self.unlocks();
            unlocks.unlock(&template.success_unblocks);
            unlocks.lock(&template.success_blocks);
        }
        if let Some(reward) = &template.reward {
            if let Some(coins) = reward.bytecoins {
                self.env.wallet.add_coins(coins);
            }
            if let Some(install) = &reward.install {
                for app in install.names() {
                    self.env.apps.install_app_named(app);
                }
            }
            if let Some(reputation) = reward.reputation {
                self.env.reputation.alter_reputation(reputation);
            }
        }

        let disarmed = mission.disarm();
        info!("[{}] '{}' succeeded", id, template.id);
        if !disarmed.is_empty() {
            debug!("[{}] cancelled pending events: {}", id, disarmed.join(", "));
        }
        Ok(template.id.clone())
    }

    /// Record failure and retire the mission. No unlocks or rewards.
    pub fn end_mission_failure(&self, id: &MissionId) -> Result<TemplateId> {
        let mission = self.claim(id)?;
        let template_id = mission.template().id.clone();
        self.stats().record_failure(&template_id, self.now());
        mission.disarm();
        info!("[{}] '{}' failed", id, template_id);
        Ok(template_id)
    }

    /// Abort a running mission from outside its script. Counts as a failure.
    pub fn cancel_mission(&self, id: &MissionId) -> Result<TemplateId> {
        let mission = self.claim(id)?;
        let template_id = mission.template().id.clone();
        self.stats().record_failure(&template_id, self.now());
        let disarmed = mission.disarm();
        info!("[{}] '{}' cancelled ({} pending events)", id, template_id, disarmed.len());
        Ok(template_id)
    }

    // ----- queries -----

    pub fn mission(&self, id: &MissionId) -> Option<Arc<Mission>> {
        self.missions().get(id).cloned()
    }

    pub fn active_missions(&self) -> Vec<MissionStatus> {
        let missions: Vec<Arc<Mission>> = self.missions().values().cloned().collect();
        missions.iter().map(|m| MissionStatus::of(m)).collect()
    }

    pub fn active_mission(&self, id: &MissionId) -> Option<MissionStatus> {
        self.mission(id).map(|m| MissionStatus::of(&m))
    }

    pub fn active_count(&self) -> usize {
        self.missions().len()
    }

    pub fn active_instances_of(&self, template_id: &TemplateId) -> usize {
        self.missions()
            .values()
            .filter(|m| &m.template().id == template_id)
            .count()
    }

    pub fn count_attempted(&self, template_id: &TemplateId) -> u64 {
        self.stats().start_count(template_id)
    }

    pub fn count_succeeded(&self, template_id: &TemplateId) -> u64 {
        self.stats().success_count(template_id)
    }

    pub fn count_failed(&self, template_id: &TemplateId) -> u64 {
        self.stats().failure_count(template_id)
    }

    pub fn template_stats(&self, template_id: &TemplateId) -> TemplateStats {
        self.stats().get(template_id)
    }

    pub fn statistics(&self) -> Vec<(TemplateId, TemplateStats)> {
        self.stats().snapshot()
    }

    /// Latest end time over every template; `None` when nothing has ended yet.
    pub fn last_mission_end_time(&self) -> Option<DateTime<Utc>> {
        self.stats().last_attempt_end_time_any_template()
    }

    pub fn unlocked_keys(&self) -> Vec<String> {
        self.unlocks().unlocked_keys()
    }

    pub fn is_unlocked(&self, key: &str) -> bool {
        self.unlocks().is_unlocked(key)
    }

    pub fn unlock<S: AsRef<str>>(&self, keys: &[S]) {
        self.unlocks().unlock(keys);
    }

    pub fn lock<S: AsRef<str>>(&self, keys: &[S]) {
        self.unlocks().lock(keys);
    }
}
