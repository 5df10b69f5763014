//! Per-template attempt counters and timestamps used for eligibility gating.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::types::TemplateId;

/// Source of wall-clock time for cooldown gates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// True when `secs` seconds after `since` lies strictly before `now`.
///
/// A wait too large for a timestamp never elapses.
pub fn has_elapsed(since: DateTime<Utc>, secs: u64, now: DateTime<Utc>) -> bool {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|wait| since.checked_add_signed(wait))
        .map_or(false, |until| until < now)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateStats {
    pub start_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_start_time: Option<DateTime<Utc>>,
    pub last_end_time: Option<DateTime<Utc>>,
}

/// Monotonic counters keyed by template.
#[derive(Debug, Clone, Default)]
pub struct StatisticsLedger {
    per_template: HashMap<TemplateId, TemplateStats>,
}

impl StatisticsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&mut self, id: &TemplateId, at: DateTime<Utc>) {
        let stats = self.per_template.entry(id.clone()).or_default();
        stats.start_count += 1;
        stats.last_start_time = Some(at);
    }

    pub fn record_success(&mut self, id: &TemplateId, at: DateTime<Utc>) {
        let stats = self.per_template.entry(id.clone()).or_default();
        stats.success_count += 1;
        stats.last_end_time = Some(at);
    }

    pub fn record_failure(&mut self, id: &TemplateId, at: DateTime<Utc>) {
        let stats = self.per_template.entry(id.clone()).or_default();
        stats.failure_count += 1;
        stats.last_end_time = Some(at);
    }

    pub fn get(&self, id: &TemplateId) -> TemplateStats {
        self.per_template.get(id).cloned().unwrap_or_default()
    }

    pub fn start_count(&self, id: &TemplateId) -> u64 {
        self.per_template.get(id).map_or(0, |s| s.start_count)
    }

    pub fn success_count(&self, id: &TemplateId) -> u64 {
        self.per_template.get(id).map_or(0, |s| s.success_count)
    }

    pub fn failure_count(&self, id: &TemplateId) -> u64 {
        self.per_template.get(id).map_or(0, |s| s.failure_count)
    }

    pub fn last_attempt_start_time(&self, id: &TemplateId) -> Option<DateTime<Utc>> {
        self.per_template.get(id).and_then(|s| s.last_start_time)
    }

    pub fn last_attempt_end_time(&self, id: &TemplateId) -> Option<DateTime<Utc>> {
        self.per_template.get(id).and_then(|s| s.last_end_time)
    }

    /// Latest end time over all templates. `None` stands for "never", which
    /// compares below every real timestamp.
    pub fn last_attempt_end_time_any_template(&self) -> Option<DateTime<Utc>> {
        self.per_template
            .values()
            .filter_map(|s| s.last_end_time)
            .max()
    }

    pub fn snapshot(&self) -> Vec<(TemplateId, TemplateStats)> {
        let mut all: Vec<_> = self
            .per_template
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
