//! `conditional: [condition, thenActions, elseActions]`
//!
//! The condition is either an expression over the mission's variables
//! (`"petanimal == 'cat'"`) or a method call on a host service:
//!
//! ```json
//! {"resolve": {"hostname": "{{router_hostname}}", "target": "service.loginserver",
//!              "method": "attemptLogin", "args": ["admin", "{{desirednewpassword}}"]}}
//! ```
//!
//! The truthiness of the result picks which list runs inline.

use log::debug;
use serde::Deserialize;
use serde_json::Value as Json;

use super::{ActionFuture, ActionHandler};
use crate::missions::condition::{Bindings, Condition, Value};
use crate::missions::errors::{MissionError, Result};
use crate::missions::mission::MissionContext;
use crate::missions::types::Action;

#[derive(Debug, Deserialize)]
struct ResolveCall {
    hostname: String,
    target: String,
    method: String,
    #[serde(default)]
    args: Vec<Json>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConditionSpec {
    Expression(String),
    Resolve { resolve: ResolveCall },
}

pub struct ConditionalAction;

impl ConditionalAction {
    fn parse(&self, params: &Json) -> Result<(ConditionSpec, Vec<Action>, Vec<Action>)> {
        let invalid = |reason: String| MissionError::invalid_params(self.kind(), reason);
        let items = params
            .as_array()
            .filter(|items| items.len() == 3)
            .ok_or_else(|| invalid(format!("expected [condition, thenActions, elseActions], got {}", params)))?;

        let condition = ConditionSpec::deserialize(&items[0])
            .map_err(|e| invalid(format!("invalid condition {}: {}", items[0], e)))?;
        let then_actions = Vec::<Action>::deserialize(&items[1])
            .map_err(|e| invalid(format!("invalid then-actions: {}", e)))?;
        let else_actions = Vec::<Action>::deserialize(&items[2])
            .map_err(|e| invalid(format!("invalid else-actions: {}", e)))?;
        Ok((condition, then_actions, else_actions))
    }

    fn evaluate(&self, condition: &ConditionSpec, ctx: &MissionContext) -> Result<bool> {
        match condition {
            ConditionSpec::Expression(source) => {
                let source = ctx.substitute(source);
                let mut bindings: Bindings = ctx
                    .variables()
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect();
                bindings.insert("missionId".to_string(), Value::from(ctx.mission_id().as_str()));
                Condition::expression(&source)?
                    .evaluate_with(&bindings)
                    .map_err(MissionError::Condition)
            }
            ConditionSpec::Resolve { resolve } => {
                let hostname = ctx.substitute(&resolve.hostname);
                let target = ctx.substitute(&resolve.target);
                let method = ctx.substitute(&resolve.method);
                let args: Vec<Value> = resolve
                    .args
                    .iter()
                    .map(|arg| match arg {
                        Json::String(s) => Value::from(ctx.substitute(s)),
                        other => Value::from(other),
                    })
                    .collect();

                let service = ctx.environment().resolve_service(Some(&hostname), &target)?;
                debug!(
                    "[{}] conditional calls {}.{} on {} with {} args",
                    ctx.mission_id(),
                    target,
                    method,
                    hostname,
                    args.len()
                );
                Ok(service.call(&method, &args)?.is_truthy())
            }
        }
    }
}

impl ActionHandler for ConditionalAction {
    fn kind(&self) -> &'static str {
        "conditional"
    }

    fn execute<'a>(&'a self, params: &'a Json, ctx: &'a MissionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let (condition, then_actions, else_actions) = self.parse(params)?;
            let result = self.evaluate(&condition, ctx)?;
            debug!("[{}] conditional result: {}", ctx.mission_id(), result);
            let branch = if result { then_actions } else { else_actions };
            ctx.execute_additional_actions(branch).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_wrong_arity() {
        let action = ConditionalAction;
        assert!(action.parse(&json!(["true", []])).is_err());
        assert!(action.parse(&json!("true")).is_err());
    }

    #[test]
    fn parses_both_condition_forms() {
        let action = ConditionalAction;
        let (cond, then_actions, else_actions) = action
            .parse(&json!(["petanimal == 'cat'", [{"send": ["a", "b"]}], []]))
            .unwrap();
        assert!(matches!(cond, ConditionSpec::Expression(_)));
        assert_eq!(then_actions.len(), 1);
        assert!(else_actions.is_empty());

        let (cond, _, _) = action
            .parse(&json!([
                {"resolve": {"hostname": "h", "target": "service.loginserver",
                             "method": "attemptLogin", "args": ["admin", "pw"]}},
                [],
                [{"schedule": "retry"}]
            ]))
            .unwrap();
        match cond {
            ConditionSpec::Resolve { resolve } => assert_eq!(resolve.args.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
