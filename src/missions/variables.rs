//! `{{name}}` placeholder substitution against a mission's variable bindings.

use super::types::Variables;

/// Replace every `{{name}}` in `text` with its binding.
///
/// Names are ASCII word characters. A placeholder whose key is unbound, or bound
/// to an empty string, becomes `{{MISSINGKEY in variables: name}}` so broken
/// content shows up in chat and logs instead of failing the mission.
pub fn replace_template_variables(text: &str, variables: &Variables) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let name_len = after_open
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();

        if name_len > 0 && after_open[name_len..].starts_with("}}") {
            let key = &after_open[..name_len];
            match variables.get(key) {
                Some(value) if !value.is_empty() => out.push_str(value),
                _ => {
                    out.push_str("{{MISSINGKEY in variables: ");
                    out.push_str(key);
                    out.push_str("}}");
                }
            }
            rest = &after_open[name_len + 2..];
        } else {
            // Not a placeholder; keep the first brace and rescan from the next one.
            out.push('{');
            rest = &rest[start + 1..];
        }
    }

    out.push_str(rest);
    out
}

/// Names of all placeholders in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let name_len = after_open
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        if name_len > 0 && after_open[name_len..].starts_with("}}") {
            names.push(&after_open[..name_len]);
            rest = &after_open[name_len + 2..];
        } else {
            rest = &rest[start + 1..];
        }
    }
    names
}
