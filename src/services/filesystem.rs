//! File modification notifications for a host.

use std::any::Any;
use std::sync::Arc;

use log::debug;

use super::{arg_str, method_key, HostService};
use crate::missions::channel::{DynChannel, EmitArgs, EventChannel};
use crate::missions::condition::Value;
use crate::missions::errors::{MissionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct FileModified {
    pub file: String,
    pub folder: String,
    pub contents: String,
    /// Username of the session that wrote the file.
    pub actor: String,
}

impl EmitArgs for FileModified {
    /// `(fileName, folderPath, contents, actor)`.
    fn emit_args(&self) -> Vec<Value> {
        vec![
            Value::from(self.file.as_str()),
            Value::from(self.folder.as_str()),
            Value::from(self.contents.as_str()),
            Value::from(self.actor.as_str()),
        ]
    }
}

pub struct FileWatchService {
    file_modified: Arc<EventChannel<FileModified>>,
}

impl FileWatchService {
    pub fn new() -> Self {
        Self {
            file_modified: Arc::new(EventChannel::new("onFileModified")),
        }
    }

    pub fn record_modification(&self, file: &str, folder: &str, contents: &str, actor: &str) {
        debug!("filesystem: {}/{} modified by {}", folder.trim_end_matches('/'), file, actor);
        self.file_modified.invoke(&FileModified {
            file: file.to_string(),
            folder: folder.to_string(),
            contents: contents.to_string(),
            actor: actor.to_string(),
        });
    }

    pub fn on_file_modified(&self) -> &EventChannel<FileModified> {
        &self.file_modified
    }
}

impl Default for FileWatchService {
    fn default() -> Self {
        Self::new()
    }
}

impl HostService for FileWatchService {
    fn short_name(&self) -> &'static str {
        "service.filesystem"
    }

    fn channel(&self, method: &str) -> Option<Arc<dyn DynChannel>> {
        match method_key(method).as_str() {
            "onfilemodified" => Some(self.file_modified.clone() as Arc<dyn DynChannel>),
            _ => None,
        }
    }

    fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let name = self.short_name();
        match method_key(method).as_str() {
            "recordmodification" => {
                self.record_modification(
                    arg_str(name, method, args, 0)?,
                    arg_str(name, method, args, 1)?,
                    arg_str(name, method, args, 2)?,
                    arg_str(name, method, args, 3)?,
                );
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
