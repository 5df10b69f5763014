//! Apps granted to the player.

use std::any::Any;
use std::sync::{Arc, Mutex};

use log::info;

use super::{arg_str, method_key, HostService};
use crate::missions::channel::{DynChannel, EmitArgs, EventChannel};
use crate::missions::condition::Value;
use crate::missions::errors::{MissionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AppInstalled {
    pub name: String,
}

impl EmitArgs for AppInstalled {
    fn emit_args(&self) -> Vec<Value> {
        vec![Value::from(self.name.as_str())]
    }
}

pub struct AppInstaller {
    installed: Mutex<Vec<String>>,
    app_installed: Arc<EventChannel<AppInstalled>>,
}

impl AppInstaller {
    pub fn new() -> Self {
        Self {
            installed: Mutex::new(Vec::new()),
            app_installed: Arc::new(EventChannel::new("onAppInstalled")),
        }
    }

    /// Install an app by name. Installing twice is a no-op that returns false.
    pub fn install_app_named(&self, name: &str) -> bool {
        {
            let mut installed = self.installed.lock().unwrap_or_else(|e| e.into_inner());
            if installed.iter().any(|n| n == name) {
                return false;
            }
            installed.push(name.to_string());
        }
        info!("apps: installed {}", name);
        self.app_installed.invoke(&AppInstalled {
            name: name.to_string(),
        });
        true
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|n| n == name)
    }

    pub fn installed_apps(&self) -> Vec<String> {
        self.installed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn on_app_installed(&self) -> &EventChannel<AppInstalled> {
        &self.app_installed
    }
}

impl Default for AppInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl HostService for AppInstaller {
    fn short_name(&self) -> &'static str {
        "service.apps"
    }

    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>> {
        match method_key(method).as_str() {
            "onappinstalled" => Some(self.app_installed.clone() as Arc<dyn DynChannel>),
            _ => None,
        }
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        match method_key(method).as_str() {
            "isinstalled" => Ok(Value::Boolean(
                self.is_installed(arg_str(self.short_name(), method, args, 0)?),
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
