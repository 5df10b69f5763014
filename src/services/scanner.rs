//! Network scanner results: discovered servers and their accounts.

use std::any::Any;
use std::sync::{Arc, RwLock};

use log::info;
use serde::{Deserialize, Serialize};

use super::login::Credentials;
use super::{method_key, HostService};
use crate::missions::channel::{DynChannel, EmitArgs, EventChannel};
use crate::missions::condition::Value;
use crate::missions::errors::{MissionError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedServer {
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<Credentials>,
}

impl ScannedServer {
    pub fn new(name: impl Into<String>, accounts: Vec<Credentials>) -> Self {
        Self {
            name: name.into(),
            accounts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServersGenerated {
    pub count: usize,
}

impl EmitArgs for ServersGenerated {
    fn emit_args(&self) -> Vec<Value> {
        vec![Value::Number(self.count as i64)]
    }
}

pub struct ScannerService {
    servers: RwLock<Vec<ScannedServer>>,
    servers_generated: Arc<EventChannel<ServersGenerated>>,
}

impl ScannerService {
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(Vec::new()),
            servers_generated: Arc::new(EventChannel::new("onServersGenerated")),
        }
    }

    /// Replace the scan results and notify listeners.
    pub fn publish_servers(&self, servers: Vec<ScannedServer>) {
        let count = servers.len();
        *self.servers.write().unwrap_or_else(|e| e.into_inner()) = servers;
        info!("scanner: {} servers discovered", count);
        self.servers_generated.invoke(&ServersGenerated { count });
    }

    pub fn servers(&self) -> Vec<ScannedServer> {
        self.servers.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn on_servers_generated(&self) -> &EventChannel<ServersGenerated> {
        &self.servers_generated
    }
}

impl Default for ScannerService {
    fn default() -> Self {
        Self::new()
    }
}

impl HostService for ScannerService {
    fn short_name(&self) -> &'static str {
        "service.scanner"
    }

    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>> {
        match method_key(method).as_str() {
            "onserversgenerated" => Some(self.servers_generated.clone() as Arc<dyn DynChannel>),
            _ => None,
        }
    }

    fn call(&self, method: &str, _args: &[Value]) -> Result<Value> {
        match method_key(method).as_str() {
            "servercount" => Ok(Value::Number(self.servers().len() as i64)),
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
