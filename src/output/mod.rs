//! Output formatting: every command produces both a JSON value (for
//! `--json`) and a plain-text rendering, chosen by [`OutputMode`].
//!
//! Grounded on the teacher's `output::print_value` dispatch shape. Unlike
//! the teacher, there is no clipboard integration here: copy-to-clipboard is
//! an explicit external collaborator (`spec.md` §1), not part of the core or
//! this CLI binary.

pub mod credential;

pub struct OutputMode {
    pub json: bool,
}

/// Print either `json_value` or the result of `text()`, depending on
/// `mode.json`. `text` is lazy so callers don't format a string that will be
/// discarded.
pub fn emit(mode: &OutputMode, json_value: serde_json::Value, text: impl FnOnce() -> String) {
    if mode.json {
        println!("{json_value}");
    } else {
        println!("{}", text());
    }
}
