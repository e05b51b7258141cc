//! Composition of the single prompt sent to the model.

use crate::input::InputSet;
use crate::{log_debug, log_warn};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::LazyLock;

/// Matches `{{SPEC}}` and `{{REQS}}`, tolerating inner spaces (`{{ SPEC }}`)
static SLOT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(SPEC|REQS)\s*\}\}").expect("Failed to compile slot pattern")
});

pub const INSTRUCTIONS_HEADER: &str = "--- SCAFFOLDING AND STYLE INSTRUCTIONS ---";
pub const SPECIFICATION_HEADER: &str = "--- API SPECIFICATION FOR ANALYSIS ---";
pub const SPECIFICATION_FOOTER: &str = "--- END OF SPECIFICATION ---";
pub const DEPENDENCIES_HEADER: &str = "--- PROJECT DEPENDENCIES ---";

/// How the instruction template and the specification are merged
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CompositionMode {
    /// Labeled sections: instructions, specification, then dependencies
    Concatenation,
    /// The instruction text carries `{{SPEC}}` / `{{REQS}}` slots
    #[default]
    Placeholder,
}

/// A named slot of a placeholder template
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Slot {
    #[strum(to_string = "{{SPEC}}")]
    Spec,
    #[strum(to_string = "{{REQS}}")]
    Reqs,
}

/// The text payload sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositePrompt {
    text: String,
    mode: CompositionMode,
    missing_slots: Vec<Slot>,
}

impl CompositePrompt {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Slots the template did not contain. Non-empty usually means a template defect.
    pub fn missing_slots(&self) -> &[Slot] {
        &self.missing_slots
    }

    /// First `max_chars` characters, for previews
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.text.chars().take(max_chars).collect();
        if self.text.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

/// Merge the inputs into one prompt. Never truncates either input.
pub fn compose(inputs: &InputSet, mode: CompositionMode) -> CompositePrompt {
    let prompt = match mode {
        CompositionMode::Concatenation => CompositePrompt {
            text: concatenate(inputs),
            mode,
            missing_slots: Vec::new(),
        },
        CompositionMode::Placeholder => substitute(inputs),
    };
    log_debug!(
        "Composed {} prompt: {} chars",
        prompt.mode,
        prompt.text.chars().count()
    );
    prompt
}

fn concatenate(inputs: &InputSet) -> String {
    let mut text = String::with_capacity(
        inputs.instruction().len() + inputs.specification().len() + 256,
    );

    writeln!(text, "{INSTRUCTIONS_HEADER}").expect("writing to string should never fail");
    text.push_str(inputs.instruction());
    text.push_str("\n\n");

    writeln!(text, "{SPECIFICATION_HEADER}").expect("writing to string should never fail");
    text.push_str(inputs.specification());
    text.push('\n');
    writeln!(text, "{SPECIFICATION_FOOTER}").expect("writing to string should never fail");

    if let Some(dependencies) = inputs.dependencies() {
        text.push('\n');
        writeln!(text, "{DEPENDENCIES_HEADER}").expect("writing to string should never fail");
        text.push_str(dependencies);
        text.push('\n');
    }

    text
}

/// Single pass over the template so substituted text is never rescanned for slots
fn substitute(inputs: &InputSet) -> CompositePrompt {
    let template = inputs.instruction();
    let mut saw_spec = false;
    let mut saw_reqs = false;

    let text = SLOT_PATTERN
        .replace_all(template, |caps: &Captures<'_>| {
            if &caps[1] == "SPEC" {
                saw_spec = true;
                inputs.specification().to_string()
            } else {
                saw_reqs = true;
                inputs.dependencies_or_sentinel().to_string()
            }
        })
        .into_owned();

    let mut missing_slots = Vec::new();
    if !saw_spec {
        missing_slots.push(Slot::Spec);
    }
    if !saw_reqs {
        missing_slots.push(Slot::Reqs);
    }
    for slot in &missing_slots {
        log_warn!("Instruction template has no {} slot; substitution skipped", slot);
    }

    CompositePrompt {
        text,
        mode: CompositionMode::Placeholder,
        missing_slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::NO_DEPENDENCIES;

    #[test]
    fn concatenation_orders_sections() {
        let inputs = InputSet::new("SPEC BODY", "INSTR BODY", Some("DEPS BODY".into()));
        let prompt = compose(&inputs, CompositionMode::Concatenation);
        let text = prompt.text();

        let instr = text.find("INSTR BODY").expect("instructions present");
        let spec = text.find("SPEC BODY").expect("spec present");
        let deps = text.find("DEPS BODY").expect("deps present");
        assert!(instr < spec && spec < deps);
        assert!(text.starts_with(INSTRUCTIONS_HEADER));
        assert!(prompt.missing_slots().is_empty());
    }

    #[test]
    fn concatenation_omits_dependency_block_when_absent() {
        let inputs = InputSet::new("spec", "instr", None);
        let prompt = compose(&inputs, CompositionMode::Concatenation);
        assert!(!prompt.text().contains(DEPENDENCIES_HEADER));
    }

    #[test]
    fn placeholder_replaces_every_occurrence() {
        let inputs = InputSet::new("S", "A {{SPEC}} B {{ SPEC }} C {{REQS}}", Some("R".into()));
        let prompt = compose(&inputs, CompositionMode::Placeholder);
        assert_eq!(prompt.text(), "A S B S C R");
        assert!(prompt.missing_slots().is_empty());
    }

    #[test]
    fn placeholder_uses_sentinel_without_dependencies() {
        let inputs = InputSet::new("S", "deps: {{REQS}} spec: {{SPEC}}", None);
        let prompt = compose(&inputs, CompositionMode::Placeholder);
        assert_eq!(prompt.text(), format!("deps: {NO_DEPENDENCIES} spec: S"));
    }

    #[test]
    fn missing_slot_is_recorded_not_fatal() {
        let inputs = InputSet::new("S", "no slots here", None);
        let prompt = compose(&inputs, CompositionMode::Placeholder);
        assert_eq!(prompt.text(), "no slots here");
        assert_eq!(prompt.missing_slots(), &[Slot::Spec, Slot::Reqs]);
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let inputs = InputSet::new("literal {{REQS}}", "{{SPEC}}", Some("deps".into()));
        let prompt = compose(&inputs, CompositionMode::Placeholder);
        assert_eq!(prompt.text(), "literal {{REQS}}");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let inputs = InputSet::new("ñññññ", "{{SPEC}}", None);
        let prompt = compose(&inputs, CompositionMode::Placeholder);
        assert_eq!(prompt.preview(3), "ñññ...");
        assert_eq!(prompt.preview(10), "ñññññ");
    }
}
