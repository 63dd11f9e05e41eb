use deci_auth::config::AuthConfig;
use deci_auth::types::Client;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// External login UI the user agent is sent to
    #[serde(default)]
    pub login: LoginConfig,
    /// Authorization engine configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Static client registrations
    #[serde(default = "default_clients")]
    pub clients: Vec<Client>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            login: LoginConfig::default(),
            auth: AuthConfig::default(),
            clients: default_clients(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Login UI validation
        if url::Url::parse(&self.login.url).is_err() {
            return Err(format!(
                "login.url must be an absolute URL, got '{}'",
                self.login.url
            ));
        }
        if self.login.shared_secret.is_empty() {
            return Err("login.shared_secret must not be empty".into());
        }
        // Auth validation
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        // Client validation
        let mut seen = std::collections::HashSet::new();
        for client in &self.clients {
            client
                .validate()
                .map_err(|e| format!("client '{}': {e}", client.client_id))?;
            if !seen.insert(client.client_id.as_str()) {
                return Err(format!("duplicate client id '{}'", client.client_id));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5556
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Where `/auth` sends the browser, with `request_id` appended
    #[serde(default = "default_login_url")]
    pub url: String,
    /// Bearer credential the login UI presents on its callbacks
    #[serde(default)]
    pub shared_secret: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            url: default_login_url(),
            shared_secret: String::new(),
        }
    }
}

impl std::fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginConfig")
            .field("url", &self.url)
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

fn default_login_url() -> String {
    "http://127.0.0.1:5557/login".to_string()
}

fn default_clients() -> Vec<Client> {
    vec![Client::new(
        "example-app",
        Some("ZXhhbXBsZS1hcHAtc2VjcmV0".to_string()),
        "Example App",
        vec!["http://127.0.0.1:5555/callback".to_string()],
    )]
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "deci.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., DECI__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("DECI")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
