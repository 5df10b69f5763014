//! Static checks for loaded mission content.
//!
//! Loading only proves a file is well-formed JSON in the right shape. The
//! checks here catch mistakes that would otherwise surface in the middle of a
//! running mission: unknown action kinds, `schedule`/`cancel` of events the
//! template does not define, and conditions that do not parse.

use std::fmt;

use serde_json::Value as Json;

use super::actions::ActionRegistry;
use super::condition::Condition;
use super::types::{Action, MissionEvent, MissionTemplate, TemplateId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentIssue {
    pub template: TemplateId,
    /// Path inside the template, e.g. `events.check.trigger`.
    pub location: String,
    pub message: String,
}

impl fmt::Display for ContentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.template, self.location, self.message)
    }
}

/// Check one template against the action kinds in `actions`.
pub fn validate_template(template: &MissionTemplate, actions: &ActionRegistry) -> Vec<ContentIssue> {
    let mut checker = Checker {
        template,
        actions,
        issues: Vec::new(),
    };
    for (name, event) in &template.events_initial {
        checker.event(&format!("eventsInitial.{}", name), event);
    }
    for (name, event) in &template.events {
        checker.event(&format!("events.{}", name), event);
    }
    checker.issues
}

struct Checker<'a> {
    template: &'a MissionTemplate,
    actions: &'a ActionRegistry,
    issues: Vec<ContentIssue>,
}

impl Checker<'_> {
    fn report(&mut self, location: &str, message: impl Into<String>) {
        self.issues.push(ContentIssue {
            template: self.template.id.clone(),
            location: location.to_string(),
            message: message.into(),
        });
    }

    fn event(&mut self, location: &str, event: &MissionEvent) {
        if event.is_race() && event.actions.as_ref().is_some_and(|a| !a.is_empty()) {
            self.report(location, "top-level actions are ignored when a trigger or timeout is set");
        }
        if let Some(actions) = &event.actions {
            self.action_list(&format!("{}.actions", location), actions);
        }
        if let Some(trigger) = &event.trigger {
            let at = format!("{}.trigger", location);
            let subscribe = &trigger.subscribe;
            if let Err(e) = Condition::compile(&subscribe.condition_args, &subscribe.condition) {
                self.report(&at, e.to_string());
            }
            self.action_list(&format!("{}.onTrigger", at), &trigger.on_trigger.actions);
        }
        if let Some(timeout) = &event.timeout {
            self.action_list(&format!("{}.timeout.onTimeout", location), &timeout.on_timeout.actions);
        }
    }

    fn action_list(&mut self, location: &str, actions: &[Action]) {
        for (i, action) in actions.iter().enumerate() {
            self.action(&format!("{}[{}]", location, i), action);
        }
    }

    fn action(&mut self, location: &str, action: &Action) {
        if self.actions.get(&action.kind).is_none() {
            self.report(location, format!("unknown action type '{}'", action.kind));
            return;
        }
        match action.kind.as_str() {
            "schedule" | "cancel" => self.event_reference(location, &action.params),
            "conditional" => self.conditional(location, &action.params),
            _ => {}
        }
    }

    fn event_reference(&mut self, location: &str, params: &Json) {
        let name = match params {
            Json::String(s) => Some(s.as_str()),
            Json::Array(items) if items.len() == 1 => items[0].as_str(),
            _ => None,
        };
        match name {
            Some(name) if self.template.events.contains_key(name) => {}
            Some(name) => self.report(location, format!("no event named '{}'", name)),
            None => self.report(location, format!("expected an event name, got {}", params)),
        }
    }

    fn conditional(&mut self, location: &str, params: &Json) {
        let Some([condition, then_actions, else_actions]) = params.as_array().map(Vec::as_slice) else {
            self.report(location, "expected [condition, thenActions, elseActions]");
            return;
        };
        if let Json::String(source) = condition {
            if let Err(e) = Condition::expression(source) {
                self.report(location, e.to_string());
            }
        }
        for (branch, list) in [("then", then_actions), ("else", else_actions)] {
            match serde_json::from_value::<Vec<Action>>(list.clone()) {
                Ok(actions) => self.action_list(&format!("{}.{}", location, branch), &actions),
                Err(e) => self.report(location, format!("invalid {} actions: {}", branch, e)),
            }
        }
    }
}
