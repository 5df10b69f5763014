//! Chat contacts and conversations.
//!
//! Messages from an NPC to the player go through [`ChatService::add_message_from`];
//! messages the player types to an NPC go through [`ChatService::add_message_to`].
//! Both emit `(contactId, message)` on their channel.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{arg_str, method_key, HostService};
use crate::logutil::escape_log;
use crate::missions::channel::{DynChannel, EmitArgs, EventChannel};
use crate::missions::condition::Value;
use crate::missions::errors::Result;

/// Sender value used for messages typed by the player.
pub const PLAYER: &str = "player";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub first: String,
    #[serde(default)]
    pub last: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl User {
    pub fn new(id: impl Into<String>, first: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first: first.into(),
            last: String::new(),
            online: true,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn display_name(&self) -> String {
        if self.last.is_empty() {
            self.first.clone()
        } else {
            format!("{} {}", self.first, self.last)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub timestamp: DateTime<Utc>,
    pub content: String,
    /// Contact id of the NPC, or [`PLAYER`].
    pub sender: String,
}

impl Message {
    fn to_value(&self) -> Value {
        Value::object([
            ("content", Value::from(self.content.as_str())),
            ("sender", Value::from(self.sender.as_str())),
            ("timestamp", Value::Number(self.timestamp.timestamp_millis())),
        ])
    }
}

/// Payload of both chat channels.
#[derive(Debug, Clone)]
pub struct ChatNotice {
    pub contact_id: String,
    pub message: Message,
}

impl EmitArgs for ChatNotice {
    fn emit_args(&self) -> Vec<Value> {
        vec![Value::from(self.contact_id.as_str()), self.message.to_value()]
    }
}

pub struct ChatService {
    contacts: RwLock<BTreeMap<String, User>>,
    conversations: RwLock<HashMap<String, Vec<Message>>>,
    message_received_from: Arc<EventChannel<ChatNotice>>,
    message_sent_to: Arc<EventChannel<ChatNotice>>,
}

impl ChatService {
    pub fn new() -> Self {
        Self {
            contacts: RwLock::new(BTreeMap::new()),
            conversations: RwLock::new(HashMap::new()),
            message_received_from: Arc::new(EventChannel::new("onMessageReceivedFrom")),
            message_sent_to: Arc::new(EventChannel::new("onMessageSentTo")),
        }
    }

    /// Add or replace a contact.
    pub fn add_contact(&self, user: User) {
        debug!("chat: contact {} ({})", user.id, user.display_name());
        self.contacts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user.id.clone(), user);
    }

    pub fn contact(&self, id: &str) -> Option<User> {
        self.contacts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contacts(&self) -> Vec<User> {
        self.contacts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn find_contacts_by_tag(&self, tag: &str) -> Vec<User> {
        self.contacts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|u| u.tags.iter().any(|t| t == tag))
            .cloned()
            .collect()
    }

    /// Deliver a message from an NPC to the player.
    pub fn add_message_from(&self, contact_id: &str, content: &str) -> Message {
        let message = self.record(contact_id, content, contact_id);
        info!("chat: {} -> player: {}", contact_id, escape_log(content));
        self.message_received_from.invoke(&ChatNotice {
            contact_id: contact_id.to_string(),
            message: message.clone(),
        });
        message
    }

    /// Record a message the player sent to a contact.
    pub fn add_message_to(&self, contact_id: &str, content: &str) -> Message {
        let message = self.record(contact_id, content, PLAYER);
        info!("chat: player -> {}: {}", contact_id, escape_log(content));
        self.message_sent_to.invoke(&ChatNotice {
            contact_id: contact_id.to_string(),
            message: message.clone(),
        });
        message
    }

    pub fn messages_for(&self, contact_id: &str) -> Vec<Message> {
        self.conversations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(contact_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn on_message_received_from(&self) -> &EventChannel<ChatNotice> {
        &self.message_received_from
    }

    pub fn on_message_sent_to(&self) -> &EventChannel<ChatNotice> {
        &self.message_sent_to
    }

    fn record(&self, contact_id: &str, content: &str, sender: &str) -> Message {
        let message = Message {
            timestamp: Utc::now(),
            content: content.to_string(),
            sender: sender.to_string(),
        };
        self.conversations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(contact_id.to_string())
            .or_default()
            .push(message.clone());
        message
    }
}

impl Default for ChatService {
    fn default() -> Self {
        Self::new()
    }
}

impl HostService for ChatService {
    fn short_name(&self) -> &'static str {
        "service.chat"
    }

    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>> {
        match method_key(method).as_str() {
            "onmessagesentto" => Some(self.message_sent_to.clone() as Arc<dyn DynChannel>),
            "onmessagereceivedfrom" => Some(self.message_received_from.clone() as Arc<dyn DynChannel>),
            _ => None,
        }
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let name = self.short_name();
        match method_key(method).as_str() {
            "addmessagefrom" => {
                self.add_message_from(arg_str(name, method, args, 0)?, arg_str(name, method, args, 1)?);
                Ok(Value::Null)
            }
            "addmessageto" => {
                self.add_message_to(arg_str(name, method, args, 0)?, arg_str(name, method, args, 1)?);
                Ok(Value::Null)
            }
            "findcontactsbytag" => {
                let tag = arg_str(name, method, args, 0)?;
                Ok(Value::List(
                    self.find_contacts_by_tag(tag)
                        .into_iter()
                        .map(|u| Value::from(u.id))
                        .collect(),
                ))
            }
            _ => Err(crate::missions::errors::MissionError::MethodNotFound {
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
    use std::sync::Mutex;

    #[test]
    fn contacts_by_tag() {
        let chat = ChatService::new();
        chat.add_contact(User::new("players.mom", "Mom").with_tags(["family", "mom"]));
        chat.add_contact(User::new("players.uncle", "Uncle").with_tags(["family", "uncle"]));

        let family: Vec<String> = chat.find_contacts_by_tag("family").into_iter().map(|u| u.id).collect();
        assert_eq!(family, vec!["players.mom", "players.uncle"]);
        assert!(chat.find_contacts_by_tag("stranger").is_empty());
    }

    #[test]
    fn sent_messages_are_recorded_and_emitted() {
        let chat = ChatService::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        chat.on_message_sent_to().add_listener(move |n: &ChatNotice| {
            s.lock().unwrap().push(n.emit_args());
            Ok(())
        });

        chat.add_message_to("players.mom", "it's fixed");
        chat.add_message_from("players.mom", "thanks");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0], Value::from("players.mom"));
        assert_eq!(seen[0][1].field("content"), Some(&Value::from("it's fixed")));
        assert_eq!(seen[0][1].field("sender"), Some(&Value::from(PLAYER)));

        let convo = chat.messages_for("players.mom");
        assert_eq!(convo.len(), 2);
        assert_eq!(convo[1].sender, "players.mom");
    }

    #[test]
    fn call_dispatches_by_normalized_name() {
        let chat = ChatService::new();
        chat.call("add_message_from", &[Value::from("npc"), Value::from("hello")]).unwrap();
        assert_eq!(chat.messages_for("npc")[0].content, "hello");
        assert!(chat.call("explode", &[]).is_err());
        assert!(chat.channel("onMessageSentTo").is_some());
        assert!(chat.channel("onNothing").is_none());
    }
}
