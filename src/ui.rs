//! Console output. Status goes to stderr so stdout carries only generated code.

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Truecolor palette, as `(r, g, b)`
pub mod rgb {
    pub const ELECTRIC_PURPLE: (u8, u8, u8) = (225, 53, 255);
    pub const NEON_CYAN: (u8, u8, u8) = (128, 255, 234);
    pub const CORAL: (u8, u8, u8) = (255, 106, 193);
    pub const ELECTRIC_YELLOW: (u8, u8, u8) = (241, 250, 140);
    pub const SUCCESS_GREEN: (u8, u8, u8) = (80, 250, 123);
    pub const ERROR_RED: (u8, u8, u8) = (255, 99, 99);
    pub const DIM_WHITE: (u8, u8, u8) = (180, 180, 190);
}

static QUIET: AtomicBool = AtomicBool::new(false);

pub fn set_quiet_mode(enabled: bool) {
    QUIET.store(enabled, Ordering::Relaxed);
}

pub fn is_quiet_mode() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Color `text` with a palette entry
pub fn paint(text: &str, (r, g, b): (u8, u8, u8)) -> ColoredString {
    text.truecolor(r, g, b)
}

/// Spinner on stderr; hidden in quiet mode
pub fn create_spinner(message: &str) -> ProgressBar {
    if is_quiet_mode() {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.magenta} {msg} {elapsed:.dim}")
            .expect("spinner template is valid")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn status(message: ColoredString) {
    if !is_quiet_mode() {
        eprintln!("{message}");
    }
}

pub fn print_info(message: &str) {
    status(paint(message, rgb::NEON_CYAN));
}

pub fn print_warning(message: &str) {
    status(paint(&format!("warning: {message}"), rgb::ELECTRIC_YELLOW).bold());
}

/// Printed even in quiet mode
pub fn print_error(message: &str) {
    eprintln!("{}", paint(message, rgb::ERROR_RED).bold());
}

pub fn print_success(message: &str) {
    status(paint(&format!("✔ {message}"), rgb::SUCCESS_GREEN).bold());
}

/// Print a labelled value, e.g. `Model: llama3.2:1b`
pub fn print_field(label: &str, value: &str) {
    if !is_quiet_mode() {
        eprintln!("  {} {value}", paint(&format!("{label}:"), rgb::DIM_WHITE));
    }
}

/// Print a block between two rules
pub fn print_bordered_content(content: &str) {
    if !is_quiet_mode() {
        let rule = paint(&"─".repeat(60), rgb::ELECTRIC_PURPLE);
        eprintln!("{rule}\n{content}\n{rule}");
    }
}
