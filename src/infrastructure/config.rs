use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "config/traffic";
const ENV_PREFIX: &str = "TRAFFIC";

/// Immutable process configuration, built once in `main`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub security: SecuritySettings,
    pub store: StoreSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
}

#[derive(Deserialize, Clone)]
pub struct SecuritySettings {
    pub api_key: String,
}

impl std::fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuritySettings")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub path: String,
    /// Read-only connections for history queries; ignored for `:memory:`.
    pub read_pool_size: usize,
}

/// Load from `config/traffic.*` (optional) with `TRAFFIC__*` env overrides.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    load_app_config_from(DEFAULT_CONFIG_FILE)
}

pub fn load_app_config_from(file: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .set_default("server.bind_addr", "0.0.0.0:8000")?
        .set_default("security.api_key", "dev-secret-key")?
        .set_default("store.path", "traffic.db")?
        .set_default("store.read_pool_size", 4_i64)?
        .add_source(config::File::with_name(file).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
