//! # Simulated Environment Services
//!
//! In-process stand-ins for the player's simulated environment. The mission
//! engine only consumes these through their event channels and a handful of
//! methods, so each service is deliberately small: enough state to make
//! missions observable and testable.
//!
//! ## Services
//!
//! - [`chat::ChatService`] - contacts and conversations with NPCs
//! - [`wallet::WalletService`] - bytecoin balance
//! - [`reputation::ReputationService`] - player reputation score
//! - [`apps::AppInstaller`] - apps granted as rewards
//! - [`scanner::ScannerService`] - scanned servers and their accounts
//! - [`hosts::HostDirectory`] - named remote hosts carrying per-host services
//!   ([`login::LoginService`], [`syslog::SyslogService`], [`filesystem::FileWatchService`])
//!
//! ## Addressing
//!
//! Triggers and conditionals name a service by its short name (`service.chat`,
//! `service.loginserver`, ...). Without a host the name is looked up in the
//! local [`Environment`]; with a host it is looked up on that host. Method and
//! event names are matched ignoring case and underscores, so content written
//! as `onMessageSentTo` and Rust-style `on_message_sent_to` both resolve.

pub mod apps;
pub mod chat;
pub mod filesystem;
pub mod hosts;
pub mod login;
pub mod reputation;
pub mod scanner;
pub mod syslog;
pub mod wallet;

use std::any::Any;
use std::sync::Arc;

pub use apps::AppInstaller;
pub use chat::{ChatNotice, ChatService, Message, User};
pub use filesystem::{FileModified, FileWatchService};
pub use hosts::{HostDirectory, RemoteHost};
pub use login::{AccountLockout, Credentials, LoginAttempt, LoginService};
pub use reputation::{ReputationChange, ReputationService};
pub use scanner::{ScannedServer, ScannerService, ServersGenerated};
pub use syslog::{SyslogService, SystemEvent};
pub use wallet::{BalanceChange, WalletService};

use crate::missions::channel::DynChannel;
use crate::missions::condition::Value;
use crate::missions::errors::{MissionError, Result};

/// A named capability that triggers can subscribe to and conditionals can call.
pub trait HostService: Send + Sync + 'static {
    /// Registry name, e.g. `service.chat`.
    fn short_name(&self) -> &'static str;

    /// Event channel for a subscribable method such as `onMessageSentTo`.
    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>>;

    /// Invoke a plain method with positional arguments.
    fn call(&self, method: &str, _args: &[Value]) -> Result<Value> {
        Err(MissionError::MethodNotFound {
            service: self.short_name().to_string(),
            method: method.to_string(),
        })
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Normalized method name: lowercase, underscores removed.
pub(crate) fn method_key(method: &str) -> String {
    method
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn arg_str<'a>(service: &str, method: &str, args: &'a [Value], index: usize) -> Result<&'a str> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| {
        MissionError::Service(format!(
            "{}.{} expects a string as argument {}",
            service,
            method,
            index + 1
        ))
    })
}

pub(crate) fn arg_number(service: &str, method: &str, args: &[Value], index: usize) -> Result<i64> {
    args.get(index).and_then(Value::as_number).ok_or_else(|| {
        MissionError::Service(format!(
            "{}.{} expects a number as argument {}",
            service,
            method,
            index + 1
        ))
    })
}

/// The collaborator bundle injected into the manager, missions, and actions.
#[derive(Clone)]
pub struct Environment {
    pub chat: Arc<ChatService>,
    pub wallet: Arc<WalletService>,
    pub reputation: Arc<ReputationService>,
    pub apps: Arc<AppInstaller>,
    pub scanner: Arc<ScannerService>,
    pub hosts: Arc<HostDirectory>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            chat: Arc::new(ChatService::new()),
            wallet: Arc::new(WalletService::new(0)),
            reputation: Arc::new(ReputationService::new(0)),
            apps: Arc::new(AppInstaller::new()),
            scanner: Arc::new(ScannerService::new()),
            hosts: Arc::new(HostDirectory::new()),
        }
    }

    /// Look up a capability of the local environment by short name (case-insensitive).
    pub fn local_service(&self, target: &str) -> Option<Arc<dyn HostService>> {
        match target.to_ascii_lowercase().as_str() {
            "service.chat" => Some(self.chat.clone() as Arc<dyn HostService>),
            "service.wallet" => Some(self.wallet.clone() as Arc<dyn HostService>),
            "service.reputation" => Some(self.reputation.clone() as Arc<dyn HostService>),
            "service.scanner" => Some(self.scanner.clone() as Arc<dyn HostService>),
            "service.apps" => Some(self.apps.clone() as Arc<dyn HostService>),
            _ => None,
        }
    }

    /// Resolve a service locally, or on a named host when `host` is given.
    pub fn resolve_service(&self, host: Option<&str>, target: &str) -> Result<Arc<dyn HostService>> {
        match host {
            None => self
                .local_service(target)
                .ok_or_else(|| MissionError::ServiceNotFound {
                    host: "the local environment".to_string(),
                    service: target.to_string(),
                }),
            Some(hostname) => {
                let remote = self
                    .hosts
                    .resolve(hostname)
                    .ok_or_else(|| MissionError::HostNotFound(hostname.to_string()))?;
                remote
                    .service_by_name(target)
                    .ok_or_else(|| MissionError::ServiceNotFound {
                        host: format!("host '{}' (has: {})", hostname, remote.service_names().join(", ")),
                        service: target.to_string(),
                    })
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
