//! Request and workspace fixtures.

use std::path::{Path, PathBuf};

use bulwark_core::{EffectSource, EffectType};
use bulwark_policy::{EffectPayload, EffectRequest};
use tempfile::TempDir;

/// An agent request to read `path`.
#[must_use]
pub fn fs_read_request(path: impl Into<String>) -> EffectRequest {
    EffectRequest::new(
        EffectType::FilesystemRead,
        EffectSource::Agent,
        EffectPayload {
            path: Some(path.into()),
            ..Default::default()
        },
    )
}

/// An agent request to write `content` to `path`.
#[must_use]
pub fn fs_write_request(path: impl Into<String>, content: impl Into<String>) -> EffectRequest {
    EffectRequest::new(
        EffectType::FilesystemWrite,
        EffectSource::Agent,
        EffectPayload {
            path: Some(path.into()),
            content: Some(content.into()),
            ..Default::default()
        },
    )
}

/// An agent request to run a mutating shell command.
#[must_use]
pub fn shell_request(command: &str, args: &[&str]) -> EffectRequest {
    EffectRequest::new(
        EffectType::ShellWrite,
        EffectSource::Agent,
        EffectPayload {
            command: Some(command.to_string()),
            args: Some(args.iter().map(ToString::to_string).collect()),
            ..Default::default()
        },
    )
}

/// An agent request to fetch `url`.
#[must_use]
pub fn network_request(url: impl Into<String>) -> EffectRequest {
    EffectRequest::new(
        EffectType::NetworkOutbound,
        EffectSource::Agent,
        EffectPayload {
            url: Some(url.into()),
            method: Some("GET".to_string()),
            ..Default::default()
        },
    )
}

/// A temporary workspace directory with a shadow root beside it.
#[derive(Debug)]
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("ws")).expect("failed to create workspace");
        Self { dir }
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    /// A shadow root outside the workspace.
    #[must_use]
    pub fn shadow_root(&self) -> PathBuf {
        self.dir.path().join("shadow")
    }

    /// Absolute path of `relative` inside the workspace.
    #[must_use]
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root().join(relative)
    }

    /// Write a file inside the workspace, creating parents.
    ///
    /// # Panics
    ///
    /// Panics on I/O failure.
    #[allow(clippy::expect_used)]
    pub fn write(&self, relative: impl AsRef<Path>, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent");
        }
        std::fs::write(&path, content).expect("failed to write file");
        path
    }

    /// Read a workspace file, `None` if it does not exist.
    #[must_use]
    pub fn read(&self, relative: impl AsRef<Path>) -> Option<String> {
        std::fs::read_to_string(self.path(relative)).ok()
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_have_targets() {
        assert!(fs_read_request("/ws/a").target().is_ok());
        assert!(fs_write_request("/ws/a", "x").target().is_ok());
        assert_eq!(
            shell_request("rm", &["-rf", "/"]).target().unwrap().normalized(),
            "rm -rf /"
        );
        assert!(network_request("https://example.com/").target().is_ok());
    }

    #[test]
    fn test_workspace_files() {
        let ws = TestWorkspace::new();
        let path = ws.write("src/lib.rs", "fn main() {}\n");
        assert!(path.starts_with(ws.root()));
        assert_eq!(ws.read("src/lib.rs").as_deref(), Some("fn main() {}\n"));
        assert!(ws.read("missing").is_none());
        assert!(!ws.shadow_root().starts_with(ws.root()));
    }
}
