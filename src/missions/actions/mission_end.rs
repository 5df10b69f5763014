//! Terminal actions. Either one ends the mission; later actions in the sequence are skipped.

use log::info;
use serde_json::Value as Json;

use super::{optional_string, ActionFuture, ActionHandler};
use crate::missions::mission::MissionContext;

pub struct MissionSucceededAction;

impl ActionHandler for MissionSucceededAction {
    fn kind(&self) -> &'static str {
        "missionSucceeded"
    }

    fn execute<'a>(&'a self, params: &'a Json, ctx: &'a MissionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let message = optional_string(self.kind(), params)?
                .map(|m| ctx.substitute(m))
                .unwrap_or_default();
            info!("[{}] SUCCEEDED: {}", ctx.mission_id(), message);
            ctx.succeed(&message)
        })
    }
}

pub struct MissionFailedAction;

impl ActionHandler for MissionFailedAction {
    fn kind(&self) -> &'static str {
        "missionFailed"
    }

    fn execute<'a>(&'a self, params: &'a Json, ctx: &'a MissionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let message = optional_string(self.kind(), params)?
                .map(|m| ctx.substitute(m))
                .unwrap_or_default();
            info!("[{}] FAILED: {}", ctx.mission_id(), message);
            ctx.fail(&message)
        })
    }
}
