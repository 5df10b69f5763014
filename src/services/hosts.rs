//! Remote hosts and the directory that names them.
//!
//! A [`RemoteHost`] is an fqdn plus a set of services keyed by short name.
//! Missions create hosts during setup (usually through
//! [`HostDirectory::fetch_or_create_tagged_host`], so that a host tagged
//! `uncle1` is shared by every mission that asks for it) and then subscribe to
//! the services on it by `hostname` + `target`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

use super::filesystem::FileWatchService;
use super::login::LoginService;
use super::syslog::SyslogService;
use super::HostService;
use crate::missions::errors::{MissionError, Result};

const HOME_WORDS: &[&str] = &["maple", "cedar", "willow", "birch", "aspen", "elm", "juniper", "alder"];

pub struct RemoteHost {
    fqdn: String,
    tag: Option<String>,
    services: RwLock<BTreeMap<String, Arc<dyn HostService>>>,
}

impl RemoteHost {
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            tag: None,
            services: RwLock::new(BTreeMap::new()),
        }
    }

    /// A host running syslog, a login server that logs to it, and a file watcher.
    pub fn standard(fqdn: impl Into<String>) -> Self {
        let host = Self::new(fqdn);
        let syslog = Arc::new(SyslogService::new());
        host.register_service(Arc::new(LoginService::new(host.fqdn.clone(), Some(syslog.clone()))));
        host.register_service(syslog);
        host.register_service(Arc::new(FileWatchService::new()));
        host
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Register a service under its short name, replacing any previous one.
    pub fn register_service(&self, service: Arc<dyn HostService>) {
        let name = service.short_name().to_ascii_lowercase();
        debug!("{}: service {} registered", self.fqdn, name);
        self.services
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, service);
    }

    pub fn service_by_name(&self, name: &str) -> Option<Arc<dyn HostService>> {
        self.services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn login(&self) -> Option<Arc<LoginService>> {
        self.typed("service.loginserver")
    }

    pub fn syslog(&self) -> Option<Arc<SyslogService>> {
        self.typed("service.syslog")
    }

    pub fn filesystem(&self) -> Option<Arc<FileWatchService>> {
        self.typed("service.filesystem")
    }

    fn typed<S: HostService>(&self, name: &str) -> Option<Arc<S>> {
        self.service_by_name(name)?.as_any().downcast::<S>().ok()
    }
}

/// All hosts known to the environment, keyed by lowercase fqdn.
pub struct HostDirectory {
    hosts: RwLock<BTreeMap<String, Arc<RemoteHost>>>,
}

impl HostDirectory {
    pub fn new() -> Self {
        Self {
            hosts: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn resolve(&self, fqdn: &str) -> Option<Arc<RemoteHost>> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&fqdn.to_ascii_lowercase())
            .cloned()
    }

    pub fn add_host(&self, host: Arc<RemoteHost>) -> Result<()> {
        let key = host.fqdn().to_ascii_lowercase();
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        if hosts.contains_key(&key) {
            return Err(MissionError::DuplicateHost(host.fqdn().to_string()));
        }
        debug!("hosts: added {}", host.fqdn());
        hosts.insert(key, host);
        Ok(())
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<Arc<RemoteHost>> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|h| h.tag() == Some(tag))
            .cloned()
    }

    /// Return the host carrying `tag`, creating and adding it when absent.
    pub fn fetch_or_create_tagged_host<F>(&self, tag: &str, create: F) -> Result<Arc<RemoteHost>>
    where
        F: FnOnce(&Self) -> RemoteHost,
    {
        if let Some(existing) = self.find_by_tag(tag) {
            return Ok(existing);
        }
        let host = Arc::new(create(self).with_tag(tag));
        self.add_host(host.clone())?;
        Ok(host)
    }

    pub fn hosts(&self) -> Vec<Arc<RemoteHost>> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// An unused `<word><n>.home` name.
    pub fn generate_home_fqdn(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let word = HOME_WORDS.choose(&mut rng).copied().unwrap_or("home");
            let candidate = format!("{}{}.home", word, rng.gen_range(1..1000));
            if self.resolve(&candidate).is_none() {
                return candidate;
            }
        }
    }
}

impl Default for HostDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_host_links_login_to_syslog() {
        let host = RemoteHost::standard("uncle.home");
        let login = host.login().unwrap();
        login.add_account("admin", "x");
        login.replace_password("admin", "y");
        assert_eq!(host.syslog().unwrap().recent_events(5).len(), 1);
        assert!(host.filesystem().is_some());
        assert_eq!(
            host.service_names(),
            vec!["service.filesystem", "service.loginserver", "service.syslog"]
        );
    }

    #[test]
    fn duplicate_hosts_are_rejected() {
        let dir = HostDirectory::new();
        dir.add_host(Arc::new(RemoteHost::new("a.home"))).unwrap();
        assert!(matches!(
            dir.add_host(Arc::new(RemoteHost::new("A.home"))),
            Err(MissionError::DuplicateHost(_))
        ));
        assert!(dir.resolve("A.HOME").is_some());
    }

    #[test]
    fn tagged_host_is_created_once() {
        let dir = HostDirectory::new();
        let first = dir
            .fetch_or_create_tagged_host("uncle1", |d| RemoteHost::standard(d.generate_home_fqdn()))
            .unwrap();
        let second = dir
            .fetch_or_create_tagged_host("uncle1", |_| panic!("should reuse the existing host"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.fqdn().ends_with(".home"));
        assert_eq!(dir.hosts().len(), 1);
    }
}
