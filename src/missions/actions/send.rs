use serde_json::Value as Json;

use super::{string_list, ActionFuture, ActionHandler};
use crate::missions::mission::MissionContext;

/// `send: [contactId, message]` delivers a chat message from an NPC to the player.
pub struct SendAction;

impl ActionHandler for SendAction {
    fn kind(&self) -> &'static str {
        "send"
    }

    fn execute<'a>(&'a self, params: &'a Json, ctx: &'a MissionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let args = string_list(self.kind(), params, 2)?;
            let from = ctx.substitute(args[0]);
            let message = ctx.substitute(args[1]);
            ctx.environment().chat.add_message_from(&from, &message);
            Ok(())
        })
    }
}
