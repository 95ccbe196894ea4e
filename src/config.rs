use std::env;

const API_URL_ENV: &str = "SIGN_API_BASE_URL";
const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Runtime settings. The classification endpoint comes from the
/// `SIGN_API_BASE_URL` environment variable and falls back to a local
/// server address.
#[derive(Clone, Debug)]
pub struct Settings {
    api_base_url: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let raw = env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::with_base_url(&raw)
    }

    fn with_base_url(raw: &str) -> Self {
        Self {
            api_base_url: raw.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn process_url(&self) -> String {
        format!("{}/process/", self.api_base_url)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_API_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_stripped() {
        let settings = Settings::with_base_url("http://api.example.com/");
        assert_eq!(settings.api_base_url(), "http://api.example.com");
        assert_eq!(settings.process_url(), "http://api.example.com/process/");

        let settings = Settings::with_base_url("http://api.example.com///");
        assert_eq!(settings.api_base_url(), "http://api.example.com");
    }

    #[test]
    fn default_points_at_local_server() {
        let settings = Settings::default();
        assert_eq!(settings.process_url(), "http://127.0.0.1:8000/process/");
    }
}
