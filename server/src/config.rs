use std::net::SocketAddr;

const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
const BASE_URL: &str = "https://openrouter.ai/api/v1";
const MODEL: &str = "meta-llama/llama-3.1-8b-instruct:free";
const LISTEN_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 3000);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub listen_addr: SocketAddr,
}

impl AppConfig {
    /// Everything but the credential is fixed; the credential comes from
    /// `OPENROUTER_API_KEY`.
    pub fn from_env() -> Self {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; upstream requests will be sent without a credential",
                API_KEY_VAR
            );
        }

        Self {
            api_key,
            ..Self::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: BASE_URL.to_string(),
            model: MODEL.to_string(),
            listen_addr: SocketAddr::from(LISTEN_ADDR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_openrouter() {
        let config = AppConfig::default();
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.model, "meta-llama/llama-3.1-8b-instruct:free");
        assert_eq!(config.listen_addr.port(), 3000);
        assert!(config.api_key.is_none());
    }
}
