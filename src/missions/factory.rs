//! Per-mission setup: bind variables and prepare the world before a mission starts.
//!
//! Every template carries an `Arc<dyn MissionFactory>`. Code-defined templates
//! usually wrap a closure in [`FnFactory`]; JSON content uses
//! [`DeclarativeSetup`], which covers what the shipped missions need:
//!
//! 1. `npcs` are added to the chat service (their ids optionally bound);
//! 2. `contacts` bind a random existing contact carrying a tag;
//! 3. `choices` pick one option at random, optionally with nested choices
//!    that depend on the option taken. Each choice `x` also binds
//!    `x_initial` (first character) and `x_length`;
//! 4. `variables` are bound after substituting everything bound so far;
//! 5. `hosts` fetch or create a tagged remote host and bind its fqdn;
//! 6. `passwords` replace a login password on a bound host.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::errors::{MissionError, Result};
use super::types::Variables;
use super::variables::replace_template_variables;
use crate::services::{Credentials, Environment, FileWatchService, LoginService, RemoteHost, SyslogService, User};

pub trait MissionFactory: Send + Sync {
    /// Prepare collaborators for a new mission and return its variable bindings.
    fn create_mission(&self, env: &Environment) -> Result<Variables>;
}

/// Fixed bindings with no side effects.
#[derive(Debug, Clone, Default)]
pub struct StaticVariables(pub Variables);

impl StaticVariables {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl MissionFactory for StaticVariables {
    fn create_mission(&self, _env: &Environment) -> Result<Variables> {
        Ok(self.0.clone())
    }
}

/// Closure-backed factory for templates defined in code.
pub struct FnFactory<F>(F);

impl<F> FnFactory<F>
where
    F: Fn(&Environment) -> Result<Variables> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> MissionFactory for FnFactory<F>
where
    F: Fn(&Environment) -> Result<Variables> + Send + Sync,
{
    fn create_mission(&self, env: &Environment) -> Result<Variables> {
        (self.0)(env)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcSetup {
    #[serde(flatten)]
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSetup {
    pub tag: String,
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceOption {
    Value(String),
    Branch {
        value: String,
        #[serde(default)]
        choices: BTreeMap<String, Vec<ChoiceOption>>,
    },
}

impl ChoiceOption {
    fn value(&self) -> &str {
        match self {
            ChoiceOption::Value(v) | ChoiceOption::Branch { value: v, .. } => v,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostServicesSetup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loginserver: Option<Vec<Credentials>>,
    #[serde(default)]
    pub syslog: bool,
    #[serde(default)]
    pub filesystem: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSetup {
    pub tag: String,
    pub variable: String,
    /// Fixed fqdn; a `<word><n>.home` name is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub services: HostServicesSetup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSetup {
    /// Variable holding the host's fqdn.
    pub host_variable: String,
    pub username: String,
    /// New password, `{{var}}` placeholders allowed.
    pub password: String,
}

/// Data-driven [`MissionFactory`] loaded from a template's `setup` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarativeSetup {
    pub npcs: Vec<NpcSetup>,
    pub contacts: Vec<ContactSetup>,
    pub choices: BTreeMap<String, Vec<ChoiceOption>>,
    pub variables: BTreeMap<String, String>,
    pub hosts: Vec<HostSetup>,
    pub passwords: Vec<PasswordSetup>,
}

impl DeclarativeSetup {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn choose(choices: &BTreeMap<String, Vec<ChoiceOption>>, vars: &mut Variables) -> Result<()> {
        let mut rng = rand::thread_rng();
        for (name, options) in choices {
            let picked = options
                .choose(&mut rng)
                .ok_or_else(|| MissionError::MissionSetup(format!("choice '{}' has no options", name)))?;
            let value = picked.value();
            vars.insert(name.clone(), value.to_string());
            vars.insert(
                format!("{}_initial", name),
                value.chars().next().map(String::from).unwrap_or_default(),
            );
            vars.insert(format!("{}_length", name), value.chars().count().to_string());
            if let ChoiceOption::Branch { choices: nested, .. } = picked {
                Self::choose(nested, vars)?;
            }
        }
        Ok(())
    }

    fn build_host(env: &Environment, setup: &HostSetup) -> Result<Arc<RemoteHost>> {
        env.hosts.fetch_or_create_tagged_host(&setup.tag, |directory| {
            let fqdn = setup
                .hostname
                .clone()
                .unwrap_or_else(|| directory.generate_home_fqdn());
            let host = RemoteHost::new(fqdn.as_str());
            let syslog = setup.services.syslog.then(|| Arc::new(SyslogService::new()));
            if let Some(accounts) = &setup.services.loginserver {
                let login = LoginService::new(fqdn.as_str(), syslog.clone());
                for account in accounts {
                    login.add_account(&account.username, &account.password);
                }
                host.register_service(Arc::new(login));
            }
            if let Some(syslog) = syslog {
                host.register_service(syslog);
            }
            if setup.services.filesystem {
                host.register_service(Arc::new(FileWatchService::new()));
            }
            host
        })
    }
}

impl MissionFactory for DeclarativeSetup {
    fn create_mission(&self, env: &Environment) -> Result<Variables> {
        let mut vars = Variables::new();

        for npc in &self.npcs {
            env.chat.add_contact(npc.user.clone());
            if let Some(var) = &npc.variable {
                vars.insert(var.clone(), npc.user.id.clone());
            }
        }

        for contact in &self.contacts {
            let candidates = env.chat.find_contacts_by_tag(&contact.tag);
            let picked = candidates.choose(&mut rand::thread_rng()).ok_or_else(|| {
                MissionError::MissionSetup(format!("no contact tagged '{}'", contact.tag))
            })?;
            vars.insert(contact.variable.clone(), picked.id.clone());
        }

        Self::choose(&self.choices, &mut vars)?;

        for (name, value) in &self.variables {
            let value = replace_template_variables(value, &vars);
            vars.insert(name.clone(), value);
        }

        for host_setup in &self.hosts {
            let host = Self::build_host(env, host_setup)?;
            vars.insert(host_setup.variable.clone(), host.fqdn().to_string());
        }

        for change in &self.passwords {
            let fqdn = vars.get(&change.host_variable).cloned().ok_or_else(|| {
                MissionError::MissionSetup(format!("variable '{}' is not bound to a host", change.host_variable))
            })?;
            let login = env
                .hosts
                .resolve(&fqdn)
                .and_then(|h| h.login())
                .ok_or_else(|| MissionError::MissionSetup(format!("host '{}' has no login server", fqdn)))?;
            let password = replace_template_variables(&change.password, &vars);
            debug!("setup: replacing password for {} on {}", change.username, fqdn);
            login.replace_password(&change.username, &password);
        }

        Ok(vars)
    }
}
