//! Per-host system log.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::info;

use super::{arg_number, arg_str, method_key, HostService};
use crate::logutil::escape_log;
use crate::missions::channel::{DynChannel, EmitArgs, EventChannel};
use crate::missions::condition::Value;
use crate::missions::errors::{MissionError, Result};

const MAX_EVENTS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct SystemEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub details: String,
}

impl EmitArgs for SystemEvent {
    /// A single object argument with `timestamp`, `type` and `details`.
    fn emit_args(&self) -> Vec<Value> {
        vec![Value::object([
            ("timestamp", Value::Number(self.timestamp.timestamp_millis())),
            ("type", Value::from(self.event_type.as_str())),
            ("details", Value::from(self.details.as_str())),
        ])]
    }
}

pub struct SyslogService {
    events: Mutex<VecDeque<SystemEvent>>,
    system_event: Arc<EventChannel<SystemEvent>>,
}

impl SyslogService {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            system_event: Arc::new(EventChannel::new("onSystemEvent")),
        }
    }

    pub fn log_event(&self, event_type: &str, details: &str) -> SystemEvent {
        let event = SystemEvent {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            details: details.to_string(),
        };
        {
            let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
            events.push_back(event.clone());
            while events.len() > MAX_EVENTS {
                events.pop_front();
            }
        }
        info!("syslog: [{}] {}", event_type, escape_log(details));
        self.system_event.invoke(&event);
        event
    }

    /// Most recent events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<SystemEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn on_system_event(&self) -> &EventChannel<SystemEvent> {
        &self.system_event
    }
}

impl Default for SyslogService {
    fn default() -> Self {
        Self::new()
    }
}

impl HostService for SyslogService {
    fn short_name(&self) -> &'static str {
        "service.syslog"
    }

    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>> {
        match method_key(method).as_str() {
            "onsystemevent" => Some(self.system_event.clone() as Arc<dyn DynChannel>),
            _ => None,
        }
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let name = self.short_name();
        match method_key(method).as_str() {
            "logevent" => {
                self.log_event(arg_str(name, method, args, 0)?, arg_str(name, method, args, 1)?);
                Ok(Value::Null)
            }
            "recentevents" => {
                let limit = arg_number(name, method, args, 0).unwrap_or(10).max(0) as usize;
                Ok(Value::List(
                    self.recent_events(limit)
                        .iter()
                        .flat_map(|e| e.emit_args())
                        .collect(),
                ))
            }
            _ => Err(MissionError::MethodNotFound {
                service: name.to_string(),
                method: method.to_string(),
            }),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
