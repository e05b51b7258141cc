use crate::ui::rgb;

use rand::prelude::*;
use std::sync::LazyLock;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColoredMessage {
    pub text: String,
    pub color: (u8, u8, u8),
}

fn message(text: &str, color: (u8, u8, u8)) -> ColoredMessage {
    ColoredMessage {
        text: text.to_string(),
        color,
    }
}

static WAITING_MESSAGES: LazyLock<Vec<ColoredMessage>> = LazyLock::new(|| {
    vec![
        message("📜 Reading the specification cover to cover...", rgb::ELECTRIC_PURPLE),
        message("🧪 Mixing assertions in the test lab...", rgb::NEON_CYAN),
        message("🔍 Hunting for every endpoint and status code...", rgb::SUCCESS_GREEN),
        message("🏗️ Raising the test scaffolding...", rgb::ELECTRIC_YELLOW),
        message("🧩 Fitting request bodies to their schemas...", rgb::CORAL),
        message("🦙 Waiting for the llama to finish typing...", rgb::DIM_WHITE),
        message("🧵 Threading fixtures through the suite...", rgb::NEON_CYAN),
        message("📐 Measuring the edges of every parameter...", rgb::ELECTRIC_PURPLE),
        message("🚦 Checking which responses should turn red...", rgb::ERROR_RED),
        message("🛠️ Forging tests from the contract...", rgb::SUCCESS_GREEN),
    ]
});

static PUBLISH_MESSAGES: LazyLock<Vec<ColoredMessage>> = LazyLock::new(|| {
    vec![
        message("🌿 Sprouting a fresh branch...", rgb::SUCCESS_GREEN),
        message("📦 Packing the tests for delivery...", rgb::ELECTRIC_YELLOW),
        message("📮 Dropping a merge request in the mailbox...", rgb::CORAL),
        message("🤝 Introducing the tests to the target repository...", rgb::NEON_CYAN),
    ]
});

pub fn get_waiting_message() -> ColoredMessage {
    let mut rng = rand::rng();
    WAITING_MESSAGES
        .choose(&mut rng)
        .cloned()
        .unwrap_or_else(|| message("Generating...", rgb::ELECTRIC_YELLOW))
}

pub fn get_publish_message() -> ColoredMessage {
    let mut rng = rand::rng();
    PUBLISH_MESSAGES
        .choose(&mut rng)
        .cloned()
        .unwrap_or_else(|| message("Publishing...", rgb::ELECTRIC_YELLOW))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_come_from_their_pools() {
        for _ in 0..20 {
            assert!(WAITING_MESSAGES.contains(&get_waiting_message()));
            assert!(PUBLISH_MESSAGES.contains(&get_publish_message()));
        }
    }
}
