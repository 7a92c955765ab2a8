//! The closed effect taxonomy.
//!
//! Every side-effecting action an agent can declare is one of the
//! [`EffectType`] variants. The set is closed: matching over it is
//! exhaustive everywhere, and unknown wire names fail to parse.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A wire name that does not belong to a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The offending value.
    pub value: String,
}

/// Kind of side effect being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffectType {
    /// Read a file from disk.
    #[serde(rename = "filesystem:read")]
    FilesystemRead,
    /// Create, modify, delete or rename a file.
    #[serde(rename = "filesystem:write")]
    FilesystemWrite,
    /// Run a shell command that only observes state.
    #[serde(rename = "shell:read")]
    ShellRead,
    /// Run a shell command that may change state.
    #[serde(rename = "shell:write")]
    ShellWrite,
    /// Make an outbound network call.
    #[serde(rename = "network:outbound")]
    NetworkOutbound,
    /// Execute generated code on the host.
    #[serde(rename = "code:execute")]
    CodeExecute,
    /// Execute generated code inside a sandbox.
    #[serde(rename = "code:execute:sandbox")]
    CodeExecuteSandbox,
    /// Read from the knowledge base.
    #[serde(rename = "knowledge:read")]
    KnowledgeRead,
    /// Write to the knowledge base.
    #[serde(rename = "knowledge:update")]
    KnowledgeUpdate,
    /// Read a stored secret.
    #[serde(rename = "secrets:read")]
    SecretsRead,
    /// Capture the screen.
    #[serde(rename = "screen:capture")]
    ScreenCapture,
    /// Drive the user interface.
    #[serde(rename = "ui:control")]
    UiControl,
}

impl EffectType {
    /// Every effect type, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::FilesystemRead,
        Self::FilesystemWrite,
        Self::ShellRead,
        Self::ShellWrite,
        Self::NetworkOutbound,
        Self::CodeExecute,
        Self::CodeExecuteSandbox,
        Self::KnowledgeRead,
        Self::KnowledgeUpdate,
        Self::SecretsRead,
        Self::ScreenCapture,
        Self::UiControl,
    ];

    /// The wire name (e.g. `filesystem:read`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilesystemRead => "filesystem:read",
            Self::FilesystemWrite => "filesystem:write",
            Self::ShellRead => "shell:read",
            Self::ShellWrite => "shell:write",
            Self::NetworkOutbound => "network:outbound",
            Self::CodeExecute => "code:execute",
            Self::CodeExecuteSandbox => "code:execute:sandbox",
            Self::KnowledgeRead => "knowledge:read",
            Self::KnowledgeUpdate => "knowledge:update",
            Self::SecretsRead => "secrets:read",
            Self::ScreenCapture => "screen:capture",
            Self::UiControl => "ui:control",
        }
    }

    /// Whether the payload target is a filesystem path.
    #[must_use]
    pub const fn targets_path(self) -> bool {
        matches!(self, Self::FilesystemRead | Self::FilesystemWrite)
    }

    /// Whether the payload target is a shell command.
    #[must_use]
    pub const fn targets_command(self) -> bool {
        matches!(self, Self::ShellRead | Self::ShellWrite)
    }

    /// Whether the payload target is a URL.
    #[must_use]
    pub const fn targets_url(self) -> bool {
        matches!(self, Self::NetworkOutbound)
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "effect type",
                value: s.to_string(),
            })
    }
}

/// Who produced an effect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSource {
    /// The agent's own reasoning loop.
    Agent,
    /// An installed toolpack.
    Toolpack,
    /// A skill package.
    ClaudeSkill,
}

impl EffectSource {
    /// The wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Toolpack => "toolpack",
            Self::ClaudeSkill => "claude_skill",
        }
    }
}

impl fmt::Display for EffectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "toolpack" => Ok(Self::Toolpack),
            "claude_skill" => Ok(Self::ClaudeSkill),
            other => Err(UnknownVariant {
                kind: "effect source",
                value: other.to_string(),
            }),
        }
    }
}

/// How long an approval is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Confirm every time.
    Always,
    /// Confirm, but remember nothing.
    Once,
    /// Remember an approval for the rest of the session.
    Session,
    /// Remember an approval until revoked.
    Permanent,
    /// Never ask; auto-approve.
    Never,
}

impl ConfirmationPolicy {
    /// Every policy, from most to least strict.
    pub const BY_STRICTNESS: [Self; 5] = [
        Self::Always,
        Self::Once,
        Self::Session,
        Self::Permanent,
        Self::Never,
    ];

    /// The wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Once => "once",
            Self::Session => "session",
            Self::Permanent => "permanent",
            Self::Never => "never",
        }
    }

    /// Strictness rank; higher means the human is asked more often.
    #[must_use]
    pub const fn strictness(self) -> u8 {
        match self {
            Self::Never => 0,
            Self::Permanent => 1,
            Self::Session => 2,
            Self::Once => 3,
            Self::Always => 4,
        }
    }

    /// Whether a human must confirm before the effect proceeds
    /// (absent a cached grant).
    #[must_use]
    pub const fn requires_confirmation(self) -> bool {
        !matches!(self, Self::Never)
    }

    /// Whether an affirmative verdict is cached as a grant.
    #[must_use]
    pub const fn caches_grant(self) -> bool {
        matches!(self, Self::Session | Self::Permanent)
    }
}

impl fmt::Display for ConfirmationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmationPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::BY_STRICTNESS
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "confirmation policy",
                value: s.to_string(),
            })
    }
}
