//! Which console commands may be sent through `server:command`.

use mcops_common::ErrorCode;

/// Commands that change lifecycle, privileges or saving. These have their
/// own operations (or none at all) and are refused as raw commands.
pub const DANGEROUS_COMMANDS: &[&str] = &[
    "stop",
    "restart",
    "op",
    "deop",
    "ban-ip",
    "pardon-ip",
    "whitelist",
    "save-off",
    "reload",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDecision {
    pub allowed: bool,
    pub base_command: String,
    pub reason: Option<ErrorCode>,
}

/// First word, leading `/` stripped, lowercased.
pub fn base_command(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .map(|word| word.trim_start_matches('/').to_lowercase())
        .unwrap_or_default()
}

pub fn decide(command: &str) -> CommandDecision {
    let base = base_command(command);
    let reason = if base.is_empty() {
        Some(ErrorCode::EmptyCommand)
    } else if DANGEROUS_COMMANDS.contains(&base.as_str()) {
        Some(ErrorCode::DangerousCommand)
    } else {
        None
    };
    CommandDecision {
        allowed: reason.is_none(),
        base_command: base,
        reason,
    }
}
