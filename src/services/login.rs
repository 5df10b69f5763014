//! Login server running on a remote host.
//!
//! Every attempt is reported on `onLoginSuccess` or `onLoginFailure` with
//! `(username, password, fqdn)`. Three or more failures for the same username
//! within [`LOCKOUT_WINDOW`] additionally emit `onAccountLockout(username)` on
//! each further failure. Lockout is only a notification; logins keep working.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::syslog::SyslogService;
use super::{arg_str, method_key, HostService};
use crate::logutil::escape_log;
use crate::missions::channel::{DynChannel, EmitArgs, EventChannel};
use crate::missions::condition::Value;
use crate::missions::errors::{MissionError, Result};

pub const LOCKOUT_THRESHOLD: usize = 3;
pub const LOCKOUT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginAttempt {
    pub username: String,
    pub password: String,
    pub fqdn: String,
}

impl EmitArgs for LoginAttempt {
    fn emit_args(&self) -> Vec<Value> {
        vec![
            Value::from(self.username.as_str()),
            Value::from(self.password.as_str()),
            Value::from(self.fqdn.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountLockout {
    pub username: String,
}

impl EmitArgs for AccountLockout {
    fn emit_args(&self) -> Vec<Value> {
        vec![Value::from(self.username.as_str())]
    }
}

pub struct LoginService {
    fqdn: String,
    accounts: Mutex<BTreeMap<String, String>>,
    failures: Mutex<HashMap<String, VecDeque<Instant>>>,
    syslog: Option<Arc<SyslogService>>,
    login_success: Arc<EventChannel<LoginAttempt>>,
    login_failure: Arc<EventChannel<LoginAttempt>>,
    account_lockout: Arc<EventChannel<AccountLockout>>,
}

impl LoginService {
    /// `syslog` receives `password-change` events when passwords are replaced.
    pub fn new(fqdn: impl Into<String>, syslog: Option<Arc<SyslogService>>) -> Self {
        Self {
            fqdn: fqdn.into(),
            accounts: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(HashMap::new()),
            syslog,
            login_success: Arc::new(EventChannel::new("onLoginSuccess")),
            login_failure: Arc::new(EventChannel::new("onLoginFailure")),
            account_lockout: Arc::new(EventChannel::new("onAccountLockout")),
        }
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Add or overwrite an account.
    pub fn add_account(&self, username: &str, password: &str) {
        self.accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(username.to_string(), password.to_string());
    }

    pub fn accounts(&self) -> Vec<Credentials> {
        self.accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(u, p)| Credentials::new(u.as_str(), p.as_str()))
            .collect()
    }

    /// Replace the password of an existing account. Unknown users are left alone.
    pub fn replace_password(&self, username: &str, password: &str) -> bool {
        let replaced = {
            let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
            match accounts.get_mut(username) {
                Some(current) => {
                    *current = password.to_string();
                    true
                }
                None => false,
            }
        };
        if replaced {
            if let Some(syslog) = &self.syslog {
                syslog.log_event("password-change", &format!("new password for user: {}", username));
            }
        } else {
            warn!("{}: no account '{}' to change password for", self.fqdn, escape_log(username));
        }
        replaced
    }

    pub fn attempt_login(&self, username: &str, password: &str) -> bool {
        let success = self
            .accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(username)
            .is_some_and(|p| p == password);

        let attempt = LoginAttempt {
            username: username.to_string(),
            password: password.to_string(),
            fqdn: self.fqdn.clone(),
        };

        if success {
            info!("{}: login succeeded for {}", self.fqdn, escape_log(username));
            self.login_success.invoke(&attempt);
            return true;
        }

        info!("{}: login failed for {}", self.fqdn, escape_log(username));
        let locked_out = self.record_failure(username);
        self.login_failure.invoke(&attempt);
        if locked_out {
            warn!("{}: account lockout for {}", self.fqdn, escape_log(username));
            self.account_lockout.invoke(&AccountLockout {
                username: username.to_string(),
            });
        }
        false
    }

    pub fn on_login_success(&self) -> &EventChannel<LoginAttempt> {
        &self.login_success
    }

    pub fn on_login_failure(&self) -> &EventChannel<LoginAttempt> {
        &self.login_failure
    }

    pub fn on_account_lockout(&self) -> &EventChannel<AccountLockout> {
        &self.account_lockout
    }

    fn record_failure(&self, username: &str) -> bool {
        let now = Instant::now();
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let window = failures.entry(username.to_string()).or_default();
        window.push_back(now);
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) > LOCKOUT_WINDOW)
        {
            window.pop_front();
        }
        window.len() >= LOCKOUT_THRESHOLD
    }
}

impl HostService for LoginService {
    fn short_name(&self) -> &'static str {
        "service.loginserver"
    }

    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>> {
        match method_key(method).as_str() {
            "onloginsuccess" => Some(self.login_success.clone() as Arc<dyn DynChannel>),
            "onloginfailure" => Some(self.login_failure.clone() as Arc<dyn DynChannel>),
            "onaccountlockout" => Some(self.account_lockout.clone() as Arc<dyn DynChannel>),
            _ => None,
        }
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let name = self.short_name();
        match method_key(method).as_str() {
            "attemptlogin" => Ok(Value::Boolean(
                self.attempt_login(arg_str(name, method, args, 0)?, arg_str(name, method, args, 1)?),
            )),
            "replacepassword" => Ok(Value::Boolean(
                self.replace_password(arg_str(name, method, args, 0)?, arg_str(name, method, args, 1)?),
            )),
            "adduseraccount" | "addaccount" => {
                self.add_account(arg_str(name, method, args, 0)?, arg_str(name, method, args, 1)?);
                Ok(Value::Null)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter<T: 'static>(channel: &EventChannel<T>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        channel.add_listener(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        count
    }

    #[test]
    fn success_and_failure_are_emitted() {
        let login = LoginService::new("uncle.home", None);
        login.add_account("admin", "factory-1234");
        let ok = counter(login.on_login_success());
        let bad = counter(login.on_login_failure());

        assert!(login.attempt_login("admin", "factory-1234"));
        assert!(!login.attempt_login("admin", "nope"));
        assert!(!login.attempt_login("ghost", "factory-1234"));
        assert_eq!(ok.load(Ordering::SeqCst), 1);
        assert_eq!(bad.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lockout_fires_from_third_failure_within_window() {
        let login = LoginService::new("uncle.home", None);
        login.add_account("admin", "secret");
        let lockouts = counter(login.on_account_lockout());

        login.attempt_login("admin", "a");
        login.attempt_login("admin", "b");
        assert_eq!(lockouts.load(Ordering::SeqCst), 0);
        login.attempt_login("admin", "c");
        login.attempt_login("admin", "d");
        assert_eq!(lockouts.load(Ordering::SeqCst), 2);

        // Not blocked.
        assert!(login.attempt_login("admin", "secret"));

        tokio::time::advance(LOCKOUT_WINDOW + Duration::from_secs(1)).await;
        login.attempt_login("admin", "e");
        assert_eq!(lockouts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn replace_password_logs_to_syslog() {
        let syslog = Arc::new(SyslogService::new());
        let login = LoginService::new("uncle.home", Some(syslog.clone()));
        login.add_account("admin", "factory-1234");

        assert!(login.replace_password("admin", "rex"));
        assert!(!login.replace_password("nobody", "x"));
        assert!(login.attempt_login("admin", "rex"));

        let events = syslog.recent_events(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "password-change");
        assert_eq!(events[0].details, "new password for user: admin");
    }
}
