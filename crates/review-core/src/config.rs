use crate::error::{AppError, Result};

pub const TITLE_MAX: usize = 200;
pub const FOCUS_MAX: usize = 500;
pub const TARGET_CHAR_COUNT: usize = 400;
pub const MIN_CHAR_COUNT: usize = 380;
pub const MAX_CHAR_COUNT: usize = 420;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STATIC_DIR: &str = "Public";

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide settings, validated once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub port: u16,
    pub static_dir: String,
    pub environment: Environment,
    pub sampling: SamplingParams,
    pub search_grounding: bool,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// A missing or blank `GEMINI_API_KEY` is a [`AppError::ConfigError`]; the
    /// caller decides whether that ends the process.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("GEMINI_API_KEY").ok_or_else(|| {
            AppError::ConfigError("GEMINI_API_KEY is not set in environment variables".into())
        })?;

        let port = match non_empty("PORT") {
            Some(p) => p
                .trim()
                .parse()
                .map_err(|_| AppError::ConfigError(format!("PORT is not a valid port: {p}")))?,
            None => DEFAULT_PORT,
        };

        let environment = non_empty("APP_ENV")
            .or_else(|| non_empty("NODE_ENV"))
            .map(|v| Environment::from_str(&v))
            .unwrap_or(Environment::Production);

        Ok(Self {
            api_key: api_key.trim().to_string(),
            model: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            api_base: non_empty("GEMINI_API_BASE")
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.into()),
            port,
            static_dir: non_empty("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.into()),
            environment,
            sampling: SamplingParams::default(),
            search_grounding: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let err = Settings::from_lookup(lookup(&[("PORT", "8080")])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ref m) if m.contains("GEMINI_API_KEY")));
    }

    #[test]
    fn blank_api_key_is_config_error() {
        let err = Settings::from_lookup(lookup(&[("GEMINI_API_KEY", "   ")])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn defaults_applied() {
        let settings = Settings::from_lookup(lookup(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(settings.api_key, "k");
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.environment, Environment::Production);
        assert!(settings.search_grounding);
        assert_eq!(settings.sampling, SamplingParams::default());
    }

    #[test]
    fn app_env_wins_over_node_env() {
        let settings = Settings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("APP_ENV", "development"),
            ("NODE_ENV", "production"),
        ]))
        .unwrap();
        assert!(settings.environment.is_development());

        let settings = Settings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("NODE_ENV", "development"),
        ]))
        .unwrap();
        assert!(settings.environment.is_development());
    }

    #[test]
    fn invalid_port_rejected() {
        let err = Settings::from_lookup(lookup(&[("GEMINI_API_KEY", "k"), ("PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ref m) if m.contains("PORT")));
    }

    #[test]
    fn api_base_trailing_slash_trimmed() {
        let settings = Settings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_API_BASE", "http://localhost:9000/v1beta/"),
        ]))
        .unwrap();
        assert_eq!(settings.api_base, "http://localhost:9000/v1beta");
    }

    #[test]
    fn default_sampling_matches_service_contract() {
        let p = SamplingParams::default();
        assert!((p.temperature - 0.9).abs() < f32::EPSILON);
        assert!((p.top_p - 0.95).abs() < f32::EPSILON);
        assert_eq!(p.top_k, 40);
        assert_eq!(p.max_output_tokens, 1024);
    }
}
