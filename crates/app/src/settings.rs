use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json},
};
use murmur_store::HttpStoreConfig;
use murmur_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "murmur";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "MURMUR_";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const MIN_REQUEST_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Value of the `sessionid` cookie issued by the server after login.
    #[serde(default)]
    pub session_cookie: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_cookie: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServerSettings {
    pub fn normalized(mut self) -> Self {
        self.base_url = if self.base_url.trim().is_empty() {
            default_base_url()
        } else {
            self.base_url.trim().to_string()
        };
        self.session_cookie = self
            .session_cookie
            .map(|cookie| cookie.trim().to_string())
            .filter(|cookie| !cookie.is_empty());
        self.request_timeout_ms = self.request_timeout_ms.max(MIN_REQUEST_TIMEOUT_MS);
        self
    }

    pub fn to_store_config(&self) -> HttpStoreConfig {
        let config = HttpStoreConfig::new(self.base_url.clone())
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms));
        match &self.session_cookie {
            Some(cookie) => config.with_session_cookie(cookie.clone()),
            None => config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppSettings {
    pub fn normalized(self) -> Self {
        Self {
            server: self.server.normalized(),
            sync: self.sync.normalized(),
        }
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<AppSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".murmur"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: AppSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Stores `cookie` as the session used for every later run.
    pub fn remember_session(&self, cookie: String) -> Result<(), SettingsError> {
        let mut settings = (*self.settings()).clone();
        settings.server.session_cookie = Some(cookie);
        self.update(settings)
    }

    /// Defaults, then the JSON file, then `MURMUR_*` variables
    /// (`MURMUR_SYNC__PAGE_SIZE` sets `sync.page_size`).
    fn load_from_disk(path: &Path) -> AppSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        // Defaults come from the serde attributes; seeding snake_case keys
        // here would collide with the camelCase aliases accepted under `sync`.
        let figment = Figment::new()
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        match figment.extract::<AppSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                AppSettings::default()
            }
        }
    }

    fn persist(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            let store = SettingsStore::new(jail.directory().join("absent.json"));

            assert_eq!(*store.settings(), AppSettings::default());
            Ok(())
        });
    }

    #[test]
    fn file_values_are_layered_over_defaults_and_normalized() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "settings.json",
                r#"{
                    "server": { "base_url": " https://chat.example.org ", "session_cookie": "  " },
                    "sync": { "pollIntervalMs": 10, "page_size": 50 }
                }"#,
            )?;

            let store = SettingsStore::new(jail.directory().join("settings.json"));
            let settings = store.settings();

            assert_eq!(settings.server.base_url, "https://chat.example.org");
            assert_eq!(settings.server.session_cookie, None);
            assert_eq!(settings.server.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
            assert_eq!(settings.sync.poll_interval_ms, 100);
            assert_eq!(settings.sync.page_size, 50);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("settings.json", r#"{ "sync": { "page_size": 50 } }"#)?;
            jail.set_env("MURMUR_SYNC__PAGE_SIZE", "30");
            jail.set_env("MURMUR_SERVER__SESSION_COOKIE", "abc123");

            let store = SettingsStore::new(jail.directory().join("settings.json"));
            let settings = store.settings();

            assert_eq!(settings.sync.page_size, 30);
            assert_eq!(settings.server.session_cookie.as_deref(), Some("abc123"));
            Ok(())
        });
    }

    #[test]
    fn unparsable_file_uses_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("settings.json", r#"{ "sync": { "page_size": "many" } }"#)?;

            let store = SettingsStore::new(jail.directory().join("settings.json"));

            assert_eq!(*store.settings(), AppSettings::default());
            Ok(())
        });
    }

    #[test]
    fn update_persists_and_reloads() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested").join("settings.json");
            let store = SettingsStore::new(path.clone());
            let mut settings = (*store.settings()).clone();
            settings.server.session_cookie = Some("token".to_string());

            store.update(settings).map_err(|error| error.to_string())?;

            assert_eq!(store.settings().server.session_cookie.as_deref(), Some("token"));
            let reloaded = SettingsStore::new(path);
            assert_eq!(reloaded.settings().server.session_cookie.as_deref(), Some("token"));
            Ok(())
        });
    }

    #[test]
    fn remembered_session_survives_reload_and_keeps_other_settings() {
        Jail::expect_with(|jail| {
            jail.create_file("settings.json", r#"{"sync": {"pageSize": 40}}"#)?;
            let path = jail.directory().join("settings.json");
            let store = SettingsStore::new(path.clone());

            store
                .remember_session("sessionid=abc".to_string())
                .map_err(|error| error.to_string())?;

            let reloaded = SettingsStore::new(path);
            assert_eq!(
                reloaded.settings().server.session_cookie.as_deref(),
                Some("sessionid=abc")
            );
            assert_eq!(reloaded.settings().sync.page_size, 40);
            Ok(())
        });
    }
}
