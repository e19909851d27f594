//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-clone\
//!   macOS:   ~/Library/Application Support/voice-clone/
//!   Linux:   ~/.config/voice-clone/
//!
//! Data dir (trained models, characteristics, registry snapshot):
//!   Windows: %LOCALAPPDATA%\voice-clone\store\
//!   macOS:   ~/Library/Application Support/voice-clone/store/
//!   Linux:   ~/.local/share/voice-clone/store/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Root of the artifact store.
    pub store_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-clone";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let store_dir = data_dir.join("store");

        Self {
            config_dir,
            settings_file,
            store_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.store_dir.ends_with("voice-clone/store"));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
    }
}
