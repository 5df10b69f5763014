//! Player reputation, never below zero.

use std::any::Any;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use log::debug;

use super::{arg_number, method_key, HostService};
use crate::missions::channel::{DynChannel, EmitArgs, EventChannel};
use crate::missions::condition::Value;
use crate::missions::errors::{MissionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ReputationChange {
    pub reputation: i64,
    pub delta: i64,
}

impl EmitArgs for ReputationChange {
    fn emit_args(&self) -> Vec<Value> {
        vec![Value::Number(self.reputation), Value::Number(self.delta)]
    }
}

pub struct ReputationService {
    reputation: AtomicI64,
    changed: Arc<EventChannel<ReputationChange>>,
}

impl ReputationService {
    pub fn new(initial: i64) -> Self {
        Self {
            reputation: AtomicI64::new(initial.max(0)),
            changed: Arc::new(EventChannel::new("onReputationChanged")),
        }
    }

    pub fn reputation(&self) -> i64 {
        self.reputation.load(Ordering::SeqCst)
    }

    /// Apply a delta, clamping the result at zero. Returns the new value.
    pub fn alter_reputation(&self, delta: i64) -> i64 {
        let mut current = self.reputation.load(Ordering::SeqCst);
        let updated = loop {
            let next = (current + delta).max(0);
            match self
                .reputation
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break next,
                Err(actual) => current = actual,
            }
        };
        debug!("reputation: {:+} -> {}", delta, updated);
        self.changed.invoke(&ReputationChange {
            reputation: updated,
            delta: updated - current,
        });
        updated
    }

    pub fn on_reputation_changed(&self) -> &EventChannel<ReputationChange> {
        &self.changed
    }
}

impl HostService for ReputationService {
    fn short_name(&self) -> &'static str {
        "service.reputation"
    }

    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>> {
        match method_key(method).as_str() {
            "onreputationchanged" => Some(self.changed.clone() as Arc<dyn DynChannel>),
            _ => None,
        }
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        match method_key(method).as_str() {
            "getreputation" | "reputation" => Ok(Value::Number(self.reputation())),
            "alterreputation" => Ok(Value::Number(
                self.alter_reputation(arg_number(self.short_name(), method, args, 0)?),
            )),
            _ => Err(MissionError::MethodNotFound {
                service: self.short_name().to_string(),
                method: method.to_string(),
            }),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
