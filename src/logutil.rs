//! Single-line rendering of content strings for log output.
//!
//! Chat messages, condition sources and syslog details come from mission
//! content or from the player, and may contain newlines. Everything that
//! reaches a log line goes through [`escape_log`] first.

use std::fmt::Write;

/// Characters kept before a preview is cut off with `…`.
pub const MAX_PREVIEW: usize = 300;

/// Escape `s` for one log line, truncated to [`MAX_PREVIEW`] characters.
pub fn escape_log(s: &str) -> String {
    escape_log_with_limit(s, MAX_PREVIEW)
}

/// `\n`, `\r`, `\t` and `\` become two-character escapes; other control
/// characters become `\xNN`.
pub fn escape_log_with_limit(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
