//! `schedule` and `cancel`: arm or disarm a named event of the running mission.

use serde_json::Value as Json;

use super::{single_string, ActionFuture, ActionHandler};
use crate::missions::mission::MissionContext;

pub struct ScheduleAction;

impl ActionHandler for ScheduleAction {
    fn kind(&self) -> &'static str {
        "schedule"
    }

    fn execute<'a>(&'a self, params: &'a Json, ctx: &'a MissionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let event = single_string(self.kind(), params)?;
            ctx.schedule_event(event).await
        })
    }
}

pub struct CancelAction;

impl ActionHandler for CancelAction {
    fn kind(&self) -> &'static str {
        "cancel"
    }

    fn execute<'a>(&'a self, params: &'a Json, ctx: &'a MissionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let event = single_string(self.kind(), params)?;
            ctx.cancel_event(event)
        })
    }
}
