// src/config.rs
use crate::errors::PixshopError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_base: String,
    pub bind_addr: String,
    pub image_model: String,
    pub video_model: String,
    pub variation_count: usize,
    pub video_poll_interval: Duration,
    /// `None` keeps polling until the backend reports completion.
    pub video_timeout: Option<Duration>,
    pub max_dimension: u32,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub static_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, PixshopError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, PixshopError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PixshopError::Config("GEMINI_API_KEY must be set".to_string()))?;

        let variation_count: usize = parse_or(&lookup, "PIXSHOP_VARIATIONS", 4)?;
        if variation_count == 0 {
            return Err(PixshopError::Config(
                "PIXSHOP_VARIATIONS must be at least 1".to_string(),
            ));
        }

        let poll_secs: u64 = parse_or(&lookup, "PIXSHOP_VIDEO_POLL_SECS", 10)?;
        let video_timeout = match lookup("PIXSHOP_VIDEO_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_value(
                "PIXSHOP_VIDEO_TIMEOUT_SECS",
                &raw,
            )?)),
            None => None,
        };

        Ok(Self {
            api_key,
            api_base: lookup("PIXSHOP_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            bind_addr: lookup("PIXSHOP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            image_model: lookup("PIXSHOP_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            video_model: lookup("PIXSHOP_VIDEO_MODEL")
                .unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string()),
            variation_count,
            video_poll_interval: Duration::from_secs(poll_secs),
            video_timeout,
            max_dimension: parse_or(&lookup, "PIXSHOP_MAX_DIMENSION", 4096)?,
            ffmpeg_path: lookup("PIXSHOP_FFMPEG").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: lookup("PIXSHOP_FFPROBE").unwrap_or_else(|| "ffprobe".to_string()),
            static_dir: lookup("PIXSHOP_STATIC_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, PixshopError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, PixshopError> {
    raw.trim()
        .parse()
        .map_err(|_| PixshopError::Config(format!("{} has an invalid value: {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, PixshopError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = config_from(&[("GEMINI_API_KEY", "secret")]).unwrap();
        assert_eq!(config.variation_count, 4);
        assert_eq!(config.video_poll_interval, Duration::from_secs(10));
        assert_eq!(config.video_timeout, None);
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn api_key_falls_back_and_is_required() {
        let config = config_from(&[("API_KEY", "fallback")]).unwrap();
        assert_eq!(config.api_key, "fallback");
        assert!(matches!(config_from(&[]), Err(PixshopError::Config(_))));
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = config_from(&[("GEMINI_API_KEY", "k"), ("PIXSHOP_VARIATIONS", "many")]);
        assert!(matches!(err, Err(PixshopError::Config(_))));
        let zero = config_from(&[("GEMINI_API_KEY", "k"), ("PIXSHOP_VARIATIONS", "0")]);
        assert!(matches!(zero, Err(PixshopError::Config(_))));
    }

    #[test]
    fn timeout_is_opt_in() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "k"),
            ("PIXSHOP_VIDEO_TIMEOUT_SECS", "300"),
            ("PIXSHOP_API_BASE", "http://localhost:9000/"),
        ])
        .unwrap();
        assert_eq!(config.video_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.api_base, "http://localhost:9000");
    }
}
