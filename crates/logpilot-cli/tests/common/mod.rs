//! Shared test utilities for logpilot-cli integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// Nothing listens here, so every model call fails fast.
pub const UNREACHABLE_API: &str = "http://127.0.0.1:9/v1";

/// A Command for the logpilot binary, isolated from the caller's environment.
#[allow(deprecated)]
pub fn logpilot_cmd() -> Command {
    let mut cmd = Command::cargo_bin("logpilot").expect("logpilot binary should exist");
    for var in [
        "LOGPILOT_CONFIG",
        "LOGPILOT_VERBOSE",
        "LOGPILOT_QUIET",
        "LOGPILOT_COLOR",
        "LLM_BASE_URL",
        "LLM_MODEL",
        "SHADOW_MODEL",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

/// A temp directory holding a config whose stores live inside it.
pub struct Sandbox {
    pub dir: TempDir,
    pub config: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::with_extra("")
    }

    /// Append raw YAML (top-level sections) to the sandbox config.
    pub fn with_extra(extra: &str) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = dir.path().join("config.yaml");
        let yaml = format!(
            "llm:\n  apiBase: {}\n  timeoutSecs: 2\nstorage:\n  dataDir: {}\nwebSearch:\n  enabled: false\n{}",
            UNREACHABLE_API,
            dir.path().join("data").display(),
            extra
        );
        fs::write(&config, yaml).expect("write config");
        Self { dir, config }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `logpilot --config <sandbox config>` run from inside the sandbox.
    pub fn cmd(&self) -> Command {
        let mut cmd = logpilot_cmd();
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .arg("--config")
            .arg(&self.config);
        cmd
    }
}
