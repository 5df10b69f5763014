//! Background loop that starts missions on its own.
//!
//! Every poll the loop asks the manager for eligible templates. It starts one
//! of them, chosen at random, when two conditions hold:
//!
//! * the minimum gap since the last mission ended (any template) has passed
//! * no mission is active at all
//!
//! The single-mission rule is a scheduler policy and is separate from any
//! per-template `maxConcurrentInstances`.
//!
//! An error while polling stops the loop for good. It has to be restarted from
//! outside.
//!
//! Control follows the usual command-channel shape: the spawned task owns the
//! stats and answers `Snapshot`/`Shutdown` requests sent through
//! [`AutoSchedulerHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::errors::{MissionError, Result};
use super::manager::MissionManager;
use super::statistics::has_elapsed;
use super::types::MissionId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_min_seconds_between_missions")]
    pub min_seconds_between_missions: u64,
    /// Delay before the first poll.
    #[serde(default = "default_start_delay_seconds")]
    pub start_delay_seconds: u64,
}

fn default_enabled() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_min_seconds_between_missions() -> u64 {
    5
}
fn default_start_delay_seconds() -> u64 {
    4
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval_ms(),
            min_seconds_between_missions: default_min_seconds_between_missions(),
            start_delay_seconds: default_start_delay_seconds(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
    pub fn min_gap(&self) -> Duration {
        Duration::from_secs(self.min_seconds_between_missions)
    }
    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(self.start_delay_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoSchedulerStats {
    pub polls: u64,
    pub missions_started: u64,
    pub skipped_busy: u64,
    pub skipped_gap: u64,
}

/// What one poll decided.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollOutcome {
    Started(MissionId),
    NothingEligible,
    TooSoon,
    Busy,
}

enum SchedulerCommand {
    Snapshot(oneshot::Sender<AutoSchedulerStats>),
    Shutdown(oneshot::Sender<()>),
}

pub struct AutoScheduler {
    manager: Arc<MissionManager>,
    config: SchedulerConfig,
}

impl AutoScheduler {
    pub fn new(manager: Arc<MissionManager>, config: SchedulerConfig) -> Self {
        Self { manager, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one poll. Returns the id of the mission it started, if any.
    pub fn consider_scheduling(&self) -> Result<Option<MissionId>> {
        Ok(match self.poll()? {
            PollOutcome::Started(id) => Some(id),
            _ => None,
        })
    }

    fn gap_elapsed(&self) -> bool {
        let Some(last_end) = self.manager.last_mission_end_time() else {
            return true;
        };
        has_elapsed(last_end, self.config.min_seconds_between_missions, self.manager.now())
    }

    fn poll(&self) -> Result<PollOutcome> {
        let eligible = self.manager.eligible_templates();
        if eligible.is_empty() {
            return Ok(PollOutcome::NothingEligible);
        }
        if !self.gap_elapsed() {
            return Ok(PollOutcome::TooSoon);
        }
        let active = self.manager.active_count();
        if active > 0 {
            debug!(
                "auto-scheduler: {} eligible templates but {} mission(s) in progress; waiting",
                eligible.len(),
                active
            );
            return Ok(PollOutcome::Busy);
        }

        let Some(template) = eligible.choose(&mut rand::thread_rng()) else {
            return Ok(PollOutcome::NothingEligible);
        };
        match self.manager.start_mission(&template.id, false) {
            Ok(id) => Ok(PollOutcome::Started(id)),
            // eligibility can change between the listing and the start
            Err(MissionError::IneligibleMission { template, eligibility }) => {
                debug!("auto-scheduler: '{}' no longer eligible ({})", template, eligibility);
                Ok(PollOutcome::NothingEligible)
            }
            Err(e) => Err(e),
        }
    }

    /// Spawn the polling loop on the current runtime.
    pub fn start(self) -> AutoSchedulerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<SchedulerCommand>();
        let running = Arc::new(AtomicBool::new(true));
        let handle = AutoSchedulerHandle {
            tx,
            running: running.clone(),
        };

        tokio::spawn(async move {
            let delay = self.config.start_delay();
            info!(
                "auto-scheduler starting (first poll in {:?}, every {:?}, min gap {:?})",
                delay,
                self.config.poll_interval(),
                self.config.min_gap()
            );

            let mut stats = AutoSchedulerStats::default();
            let first_poll = tokio::time::Instant::now() + delay;
            let mut ticker = tokio::time::interval_at(first_poll, self.config.poll_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(SchedulerCommand::Snapshot(resp)) => { let _ = resp.send(stats); }
                        Some(SchedulerCommand::Shutdown(done)) => {
                            running.store(false, Ordering::SeqCst);
                            let _ = done.send(());
                            break;
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        stats.polls += 1;
                        match self.poll() {
                            Ok(PollOutcome::Started(id)) => {
                                stats.missions_started += 1;
                                debug!("auto-scheduler started {}", id);
                            }
                            Ok(PollOutcome::Busy) => stats.skipped_busy += 1,
                            Ok(PollOutcome::TooSoon) => stats.skipped_gap += 1,
                            Ok(PollOutcome::NothingEligible) => {}
                            Err(e) => {
                                error!("Critical error in mission auto-scheduler, stopping (manual restart required): {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
            info!(
                "auto-scheduler stopped after {} polls, {} missions started",
                stats.polls, stats.missions_started
            );
        });

        handle
    }
}

#[derive(Clone, Debug)]
pub struct AutoSchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
    running: Arc<AtomicBool>,
}

impl AutoSchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for it to acknowledge.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SchedulerCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Current counters, or `None` once the loop has ended.
    pub async fn snapshot(&self) -> Option<AutoSchedulerStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SchedulerCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }
}
