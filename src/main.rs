//! Binary entrypoint for the missiond CLI.
//!
//! Commands:
//! - `run` - boot the simulated environment, load content and start the auto-scheduler
//! - `list` - print every template with its eligibility predicates
//! - `init` - create a starter `config.toml`
//! - `validate` - load content and check actions, event references and conditions
//!
//! See the library crate docs for module-level details: `missiond::`.
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use missiond::config::Config;
use missiond::missions::{
    validate_template, ActionRegistry, AutoScheduler, MissionManager, SystemClock, TemplateRegistry,
};
use missiond::services::{ChatNotice, Environment};

#[derive(Parser)]
#[command(name = "missiond")]
#[command(about = "A content-driven mission orchestration engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine with the interactive chat shell
    Run {
        /// Mission content path, overriding `content.missions_path`
        #[arg(short, long)]
        missions: Option<String>,
        /// Do not start the auto-scheduler
        #[arg(long)]
        no_auto: bool,
    },
    /// List templates and whether each could start right now
    List,
    /// Initialize a new configuration file
    Init,
    /// Load mission content and report problems
    Validate {
        /// Mission content path, overriding `content.missions_path`
        #[arg(short, long)]
        missions: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Some(load_config(&cli.config).await?),
    };
    init_logging(&pre_config, cli.verbose);
    let config = pre_config.unwrap_or_default();

    match cli.command {
        Commands::Run { missions, no_auto } => {
            info!("Starting missiond v{}", env!("CARGO_PKG_VERSION"));
            let path = missions.unwrap_or_else(|| config.content.missions_path.clone());
            let env = Environment::new();
            let manager = build_manager(&config, &path, env.clone())?;

            env.chat
                .on_message_received_from()
                .add_listener(|notice: &ChatNotice| {
                    println!("<{}> {}", notice.contact_id, notice.message.content);
                    Ok(())
                });

            let scheduler = if config.scheduler.enabled && !no_auto {
                Some(AutoScheduler::new(manager.clone(), config.scheduler.clone()).start())
            } else {
                info!("Auto-scheduler disabled; start missions with `start <template>`");
                None
            };

            #[cfg(feature = "demo-shell")]
            tokio::select! {
                result = shell::run(manager.clone(), env.clone()) => result?,
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
            #[cfg(not(feature = "demo-shell"))]
            tokio::signal::ctrl_c().await?;

            if let Some(handle) = scheduler {
                if let Some(stats) = handle.snapshot().await {
                    info!(
                        "Auto-scheduler: {} polls, {} started, {} skipped busy, {} skipped gap",
                        stats.polls, stats.missions_started, stats.skipped_busy, stats.skipped_gap
                    );
                }
                handle.stop().await;
            }
            for status in manager.active_missions() {
                if let Err(e) = manager.cancel_mission(&status.id) {
                    warn!("Failed to cancel {}: {}", status.id, e);
                }
            }
        }
        Commands::List => {
            let manager = build_manager(&config, &config.content.missions_path, Environment::new())?;
            for template in manager.all_templates() {
                println!(
                    "{:<28} {:<24} {}",
                    template.id,
                    template.title,
                    manager.eligibility(&template)
                );
            }
        }
        Commands::Init => {
            if std::path::Path::new(&cli.config).exists() {
                return Err(anyhow!("Config file {} already exists", cli.config));
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Validate { missions } => {
            let path = missions.unwrap_or_else(|| config.content.missions_path.clone());
            let registry = TemplateRegistry::load(&path)?;
            let actions = ActionRegistry::with_builtin_handlers();
            let mut problems = 0;
            for template in registry.get_mission_templates() {
                for issue in validate_template(&template, &actions) {
                    println!("{}", issue);
                    problems += 1;
                }
            }
            println!("{} templates checked, {} problems", registry.len(), problems);
            if problems > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist.
async fn load_config(path: &str) -> Result<Config> {
    if tokio::fs::metadata(path).await.is_err() {
        return Ok(Config::default());
    }
    Config::load(path).await
}

fn build_manager(config: &Config, missions_path: &str, env: Environment) -> Result<Arc<MissionManager>> {
    let registry = TemplateRegistry::load(missions_path)
        .map_err(|e| anyhow!("Failed to load missions from {}: {}", missions_path, e))?;
    let manager = MissionManager::new(
        registry,
        env,
        Arc::new(ActionRegistry::with_builtin_handlers()),
        Arc::new(SystemClock),
    );
    manager.unlock(&config.content.initial_unlocks);
    Ok(manager)
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| log::LevelFilter::from_str(&c.logging.level).ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| std::fs::OpenOptions::new().create(true).append(true).open(file).ok());

    if let Some(f) = log_file {
        let write_mutex = Arc::new(std::sync::Mutex::new(f));
        // Foreground runs log to both file and console
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}

/// Line-oriented stand-in for the player's desktop.
#[cfg(feature = "demo-shell")]
mod shell {
    use std::sync::Arc;

    use anyhow::Result;
    use rand::Rng;
    use tokio::io::{AsyncBufReadExt, BufReader};

    use missiond::missions::{MissionId, MissionManager, TemplateId};
    use missiond::services::{Credentials, Environment, ScannedServer};

    const HELP: &str = "\
commands:
  to <contact> <text>             send a chat message
  contacts                        list chat contacts
  missions                        list active missions and their events
  start <template>                force-start a mission
  cancel <mission>                cancel an active mission
  hosts                           list remote hosts
  login <host> <user> <password>  attempt a login
  passwd <host> <user> <password> change a password
  reboot <host>                   reboot a host (logs a syslog event)
  scan                            generate scanned servers
  wallet                          show coins, reputation and apps
  quit";

    pub async fn run(manager: Arc<MissionManager>, env: Environment) -> Result<()> {
        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            let args: Vec<&str> = rest.split_whitespace().collect();
            match (command.to_ascii_lowercase().as_str(), args.as_slice()) {
                ("quit" | "exit", _) => break,
                ("help" | "?", _) => println!("{}", HELP),
                ("to", [contact, ..]) => {
                    let text = rest.trim_start()[contact.len()..].trim();
                    if env.chat.contact(contact).is_none() {
                        println!("no contact '{}'", contact);
                    } else {
                        env.chat.add_message_to(contact, text);
                    }
                }
                ("contacts", _) => {
                    for user in env.chat.contacts() {
                        println!("{:<20} {:<16} [{}]", user.id, user.display_name(), user.tags.join(", "));
                    }
                }
                ("missions", _) => {
                    for status in manager.active_missions() {
                        println!("{} {} ({})", status.id, status.template_id, status.title);
                        for (event, state) in status.events {
                            println!("    {:<28} {}", event, state);
                        }
                    }
                }
                ("start", [template]) => match manager.start_mission(&TemplateId::new(*template), true) {
                    Ok(id) => println!("started {}", id),
                    Err(e) => println!("{}", e),
                },
                ("cancel", [mission]) => match manager.cancel_mission(&MissionId::new(*mission)) {
                    Ok(template) => println!("cancelled {} ({})", mission, template),
                    Err(e) => println!("{}", e),
                },
                ("hosts", _) => {
                    for host in env.hosts.hosts() {
                        println!("{:<24} {}", host.fqdn(), host.service_names().join(", "));
                    }
                }
                ("login", [host, user, password]) => match env.hosts.resolve(host).and_then(|h| h.login()) {
                    Some(login) if login.attempt_login(user, password) => println!("login ok"),
                    Some(_) => println!("login failed"),
                    None => println!("no login server on '{}'", host),
                },
                ("passwd", [host, user, password]) => match env.hosts.resolve(host).and_then(|h| h.login()) {
                    Some(login) if login.replace_password(user, password) => println!("password changed"),
                    Some(_) => println!("no account '{}'", user),
                    None => println!("no login server on '{}'", host),
                },
                ("reboot", [host]) => match env.hosts.resolve(host).and_then(|h| h.syslog()) {
                    Some(syslog) => {
                        syslog.log_event("reboot", "system reboot requested from console");
                        println!("{} is rebooting", host);
                    }
                    None => println!("no such host '{}'", host),
                },
                ("scan", _) => {
                    let servers = generate_servers(5);
                    println!("found {} servers", servers.len());
                    env.scanner.publish_servers(servers);
                }
                ("wallet", _) => {
                    println!(
                        "coins: {}  reputation: {}  apps: [{}]",
                        env.wallet.balance(),
                        env.reputation.reputation(),
                        env.apps.installed_apps().join(", ")
                    );
                }
                _ => println!("unknown command, try `help`"),
            }
        }
        Ok(())
    }

    fn generate_servers(count: usize) -> Vec<ScannedServer> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let name = format!("10.{}.{}.{}", rng.gen_range(0..=255), rng.gen_range(0..=255), rng.gen_range(1..=254));
                let accounts = (0..rng.gen_range(1..=3))
                    .map(|i| Credentials::new(format!("user{}", i), format!("pw{:04}", rng.gen_range(0..10_000))))
                    .collect();
                ScannedServer::new(name, accounts)
            })
            .collect()
    }
}
