//! `sharescannedcreds: contactId`
//!
//! Has a contact hand the player credentials for up to three random scanned
//! servers, one random account each. Runs at most once per registry. When the
//! scanner has not produced servers yet, a one-shot listener waits for the
//! first batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};
use rand::seq::SliceRandom;
use serde_json::Value as Json;

use super::{single_string, ActionFuture, ActionHandler};
use crate::missions::channel::ListenerId;
use crate::missions::mission::MissionContext;
use crate::services::{ChatService, ScannedServer, ScannerService, ServersGenerated};

pub const SERVERS_TO_SHARE: usize = 3;

pub struct ShareScannedCredsAction {
    shared: Arc<AtomicBool>,
}

impl ShareScannedCredsAction {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(AtomicBool::new(false)),
        }
    }

    fn share(shared: &AtomicBool, chat: &ChatService, from: &str, mut servers: Vec<ScannedServer>) {
        if shared.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut rng = rand::thread_rng();
        servers.shuffle(&mut rng);
        for server in servers.iter().take(SERVERS_TO_SHARE) {
            match server.accounts.choose(&mut rng) {
                Some(account) => {
                    chat.add_message_from(
                        from,
                        &format!(
                            "here's the server creds...{} - {} - {}",
                            server.name, account.username, account.password
                        ),
                    );
                }
                None => warn!("sharescannedcreds: server {} has no accounts to share", server.name),
            }
        }
    }

    fn wait_for_servers(&self, scanner: Arc<ScannerService>, chat: Arc<ChatService>, from: String) {
        info!("sharescannedcreds: no servers yet, waiting for the scanner");
        let shared = self.shared.clone();
        let own_id: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let slot = own_id.clone();
        let weak_scanner = Arc::downgrade(&scanner);
        let listener_chat = chat.clone();
        let listener_from = from.clone();

        let id = scanner.on_servers_generated().add_listener(move |_: &ServersGenerated| {
            let Some(scanner) = weak_scanner.upgrade() else {
                return Ok(());
            };
            if let Some(id) = *slot.lock().unwrap_or_else(|e| e.into_inner()) {
                scanner.on_servers_generated().remove_listener(id);
            }
            Self::share(&shared, &listener_chat, &listener_from, scanner.servers());
            Ok(())
        });
        *own_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);

        // a batch may have landed before the listener was registered
        let servers = scanner.servers();
        if !servers.is_empty() || self.shared.load(Ordering::SeqCst) {
            scanner.on_servers_generated().remove_listener(id);
            Self::share(&self.shared, &chat, &from, servers);
        }
    }
}

impl Default for ShareScannedCredsAction {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for ShareScannedCredsAction {
    fn kind(&self) -> &'static str {
        "sharescannedcreds"
    }

    fn execute<'a>(&'a self, params: &'a Json, ctx: &'a MissionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let from = ctx.substitute(single_string(self.kind(), params)?);
            if self.shared.load(Ordering::SeqCst) {
                info!("sharescannedcreds: credentials were already shared, skipping");
                return Ok(());
            }

            let env = ctx.environment();
            let servers = env.scanner.servers();
            if servers.is_empty() {
                self.wait_for_servers(env.scanner.clone(), env.chat.clone(), from);
            } else {
                Self::share(&self.shared, &env.chat, &from, servers);
            }
            Ok(())
        })
    }
}
