//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate locations.
//!
//! | Purpose | Linux | macOS |
//! |---------|-------|-------|
//! | Data (session, logs) | `~/.local/share/team-relay/` | `~/Library/Application Support/team-relay/` |
//! | Config | `~/.config/team-relay/` | `~/Library/Application Support/team-relay/` |
//!
//! Overrides: `TEAM_RELAY_DATA_DIR`, `TEAM_RELAY_CONFIG_DIR`.

use std::path::PathBuf;

const APP_DIR: &str = "team-relay";

/// Application data root.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TEAM_RELAY_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/team-relay-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TEAM_RELAY_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/team-relay-config"))
}

/// Default config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default session credential directory (`data_dir()/session/`).
#[must_use]
pub fn session_dir() -> PathBuf {
    data_dir().join("session")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_ends_with_config_toml() {
        let path = config_file();
        let s = path.to_string_lossy();
        assert!(s.ends_with("config.toml"), "config_file: {s}");
    }

    #[test]
    fn session_dir_is_subpath_of_data_dir() {
        assert!(session_dir().starts_with(data_dir()));
    }
}
