//! CLI theme and styling.

use bulwark_core::RiskScore;
use bulwark_shadow::ShadowStatus;
use colored::Colorize;

/// CLI theme configuration.
pub(crate) struct Theme;

impl Theme {
    /// Format a header.
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    pub(crate) fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format an info message.
    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    /// Format a dimmed message.
    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    pub(crate) fn separator() -> String {
        "━".repeat(50).dimmed().to_string()
    }

    /// Format a key-value pair.
    pub(crate) fn kv(key: &str, value: &str) -> String {
        format!("  {}: {}", key.dimmed(), value)
    }

    /// Color a risk score by band.
    pub(crate) fn risk(score: RiskScore) -> String {
        let text = score.to_string();
        match score.get() {
            0..=3 => text.green().to_string(),
            4..=6 => text.yellow().to_string(),
            7..=8 => text.red().to_string(),
            _ => text.red().bold().to_string(),
        }
    }

    /// Color a shadow status.
    pub(crate) fn status(status: ShadowStatus) -> String {
        let text = status.as_str();
        match status {
            ShadowStatus::Pending => text.yellow().to_string(),
            ShadowStatus::Approved => text.cyan().to_string(),
            ShadowStatus::Applied => text.green().to_string(),
            ShadowStatus::Rejected => text.dimmed().to_string(),
            ShadowStatus::Conflict => text.red().to_string(),
        }
    }

    /// Color one line of a unified diff.
    pub(crate) fn diff_line(line: &str) -> String {
        if line.starts_with("+++") || line.starts_with("---") {
            line.bold().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else if line.starts_with("@@") {
            line.cyan().to_string()
        } else {
            line.to_string()
        }
    }

    /// Shorten an id for tables.
    pub(crate) fn short_id(id: &str) -> String {
        id.chars().take(8).collect()
    }
}
