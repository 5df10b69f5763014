use std::time::Duration;

use serde_json::Value as Json;

use super::{single_number, ActionFuture, ActionHandler};
use crate::missions::mission::MissionContext;

/// `delay: ms` suspends the current action sequence only.
pub struct DelayAction;

impl ActionHandler for DelayAction {
    fn kind(&self) -> &'static str {
        "delay"
    }

    fn execute<'a>(&'a self, params: &'a Json, _ctx: &'a MissionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let ms = single_number(self.kind(), params)?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        })
    }
}
