use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub relay: RelaySettings,
    pub reconnect: ReconnectSettings,
    pub identity: IdentitySettings,
    pub room: RoomSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Built-in defaults so every key may be omitted
            .add_source(Config::try_from(&Settings::default())?)
            // Optional environment-specific file (e.g., config/development.toml)
            .add_source(
                File::with_name(&format!("config/{}", run_mode))
                    .format(FileFormat::Toml)
                    .required(false),
            )
            // Environment variables (e.g., APP_RELAY__URL=wss://nos.lol)
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingSettings {
    pub directory: String,
    pub filename: String,
    /// Used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            filename: "nostr-tictactoe.log".to_string(),
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelaySettings {
    pub url: String,
    pub connect_timeout_seconds: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            url: "wss://relay.damus.io".to_string(),
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconnectSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// Secret key supplied directly (nsec or hex).
    #[default]
    Key,
    /// External signing program.
    Delegated,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct IdentitySettings {
    pub method: LoginMethod,
    pub secret_key: Option<String>,
    pub signer_command: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoomSettings {
    /// Page that receives `?room=..&relay=..` share links.
    pub share_base_url: String,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            share_base_url: "https://nostr-tictactoe.app/play".to_string(),
        }
    }
}
