//! Small environment-variable lookups used at startup, kept out of
//! `config.rs` because they are process-environment overrides rather than
//! config-file fields.

const CONFIG_PATH: &str = "UPTIME_ENGINE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./config.json";

pub fn get_config_path() -> String {
    std::env::var(CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const API_PORT: &str = "UPTIME_ENGINE_API_PORT";

pub fn get_api_port(default_port: u16) -> u16 {
    let port_from_env = std::env::var(API_PORT);
    port_from_env.map_or(default_port, |res| res.parse().unwrap_or(default_port))
}

const API_AUTH_TOKEN: &str = "UPTIME_ENGINE_API_AUTH_TOKEN";

/// Overrides (or supplies) the status API's bearer token, so it doesn't have
/// to be checked into a config file.
pub fn get_api_auth_token() -> Option<String> {
    std::env::var(API_AUTH_TOKEN).ok()
}

const EMAIL_API_KEY: &str = "UPTIME_ENGINE_EMAIL_API_KEY";

/// Overrides (or supplies) the email provider's API key, so it doesn't have
/// to be checked into a config file.
pub fn get_email_api_key() -> Option<String> {
    std::env::var(EMAIL_API_KEY).ok()
}
