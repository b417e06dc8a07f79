//! ArchiveWorld pattern for declarative test setup.
//!
//! Provides:
//! - An isolated temp directory per test
//! - Archive creation from fixtures
//! - A client config file pointing at test settings
//! - CLI execution with that environment

use anyhow::Result;
use assert_cmd::Command;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::fixtures::ArchiveFixture;

/// Declarative test environment builder.
///
/// # Example
/// ```no_run
/// use pmctx_testing::{ArchiveFixture, ArchiveWorld};
///
/// let world = ArchiveWorld::new()
///     .with_archive(ArchiveFixture::new("20240101", 1_704_067_200))
///     .with_archive(ArchiveFixture::new("20240102", 1_704_153_600));
///
/// let result = world.run(&["label", &world.archive("20240101")]).unwrap();
/// assert!(result.success());
/// ```
pub struct ArchiveWorld {
    temp_dir: TempDir,
    archive_dir: PathBuf,
    config_path: PathBuf,
    env_vars: HashMap<String, String>,
}

impl Default for ArchiveWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWorld {
    /// Create a new isolated test environment.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let archive_dir = temp_dir.path().join("archives");
        std::fs::create_dir_all(&archive_dir).expect("Failed to create archive dir");
        let config_path = temp_dir.path().join("config.toml");

        Self {
            temp_dir,
            archive_dir,
            config_path,
            env_vars: HashMap::new(),
        }
    }

    /// Directory holding the generated archives.
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Base name of archive `name` inside this world, as a string.
    pub fn archive(&self, name: &str) -> String {
        self.archive_dir.join(name).to_string_lossy().into_owned()
    }

    /// Comma-separated list of archives, in the given order.
    pub fn archive_list(&self, names: &[&str]) -> String {
        names
            .iter()
            .map(|n| self.archive(n))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Write an archive (builder style).
    pub fn with_archive(self, fixture: ArchiveFixture) -> Self {
        self.add_archive(&fixture).expect("Failed to write archive");
        self
    }

    /// Write an archive, returning its base name.
    pub fn add_archive(&self, fixture: &ArchiveFixture) -> Result<String> {
        let base = fixture.write_into(&self.archive_dir)?;
        Ok(base.to_string_lossy().into_owned())
    }

    /// Write an archive into a subdirectory (created on demand).
    pub fn add_archive_in(&self, subdir: &str, fixture: &ArchiveFixture) -> Result<String> {
        let dir = self.archive_dir.join(subdir);
        std::fs::create_dir_all(&dir)?;
        let base = fixture.write_into(&dir)?;
        Ok(base.to_string_lossy().into_owned())
    }

    /// Delete every file of archive `name` (metadata, index, volumes).
    pub fn remove_archive(&self, name: &str) -> Result<()> {
        let prefix = format!("{}.", name);
        for entry in std::fs::read_dir(&self.archive_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Write the client config file used by CLI runs.
    pub fn with_config(self, toml: &str) -> Self {
        std::fs::write(&self.config_path, toml).expect("Failed to write config");
        self
    }

    /// Set an environment variable for CLI execution.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Configure a CLI command with this environment's settings.
    pub fn configure_command<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.env("PMCTX_CONFIG", &self.config_path);
        cmd.env_remove("PMCD_RECONNECT_TIMEOUT");
        cmd.current_dir(self.temp_dir.path());

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd
    }

    /// Execute the pmctx binary with `args`.
    #[allow(deprecated)]
    pub fn run(&self, args: &[&str]) -> Result<CliResult> {
        let mut cmd = Command::cargo_bin("pmctx")
            .map_err(|e| anyhow::anyhow!("Failed to find pmctx binary: {}", e))?;

        self.configure_command(&mut cmd);
        cmd.args(args);

        let output = cmd.output()?;

        Ok(CliResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Result of a CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}
