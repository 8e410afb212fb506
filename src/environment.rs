//! Environment handed to every child process.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default root for the redirected home, config, cache, state and data dirs.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Immutable environment map built once at startup.
///
/// Starts from the inherited process environment and overrides the home and
/// XDG directories so the CLI keeps its credentials and caches under the data
/// root. The process environment itself is never mutated.
#[derive(Debug, Clone, Default)]
pub struct LaunchEnv {
    vars: BTreeMap<String, String>,
}

impl LaunchEnv {
    /// Inherit the current process environment and redirect into `data_dir`.
    pub fn from_process(data_dir: &Path) -> Self {
        Self::from_vars(std::env::vars(), data_dir)
    }

    /// Build from an explicit base environment.
    pub fn from_vars<I>(base: I, data_dir: &Path) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut vars: BTreeMap<String, String> = base.into_iter().collect();
        for (key, dir) in redirected_dirs(data_dir) {
            vars.insert(key.to_string(), dir.to_string_lossy().into_owned());
        }
        let env = Self { vars };
        info!(
            home = env.get("HOME").unwrap_or_default(),
            config_dir = env.get("ANTHROPIC_CONFIG_DIR").unwrap_or_default(),
            "Launch environment prepared"
        );
        env
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// The `PATH` children will search, if any.
    pub fn search_path(&self) -> Option<OsString> {
        self.get("PATH").map(OsString::from)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }
}

fn redirected_dirs(data_dir: &Path) -> [(&'static str, PathBuf); 6] {
    [
        ("HOME", data_dir.join("home")),
        ("ANTHROPIC_CONFIG_DIR", data_dir.join(".config/claude")),
        ("XDG_CONFIG_HOME", data_dir.join(".config")),
        ("XDG_CACHE_HOME", data_dir.join(".cache")),
        ("XDG_STATE_HOME", data_dir.join(".local/state")),
        ("XDG_DATA_HOME", data_dir.join(".local/share")),
    ]
}
