//! Configuration resolution for tphysio-ai
//!
//! Gemini API key priority: ENV (`TPHYSIO_GEMINI_API_KEY`, then
//! `GEMINI_API_KEY`) → TOML `gemini_api_key`.

use tphysio_common::config::TomlConfig;
use tphysio_common::{Error, Result};
use tracing::{info, warn};

/// Preferred environment variable for the Gemini key
pub const GEMINI_KEY_ENV: &str = "TPHYSIO_GEMINI_API_KEY";

/// Environment variable used by earlier deployments
pub const LEGACY_GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

/// Resolve the Gemini API key from environment and TOML
pub fn resolve_gemini_api_key(toml_config: &TomlConfig) -> Result<String> {
    let candidates = [
        ("environment", env_key(GEMINI_KEY_ENV)),
        ("environment (legacy)", env_key(LEGACY_GEMINI_KEY_ENV)),
        ("TOML", toml_config.gemini_api_key.clone()),
    ];

    let sources: Vec<&str> = candidates
        .iter()
        .filter(|(_, key)| key.as_deref().is_some_and(is_valid_key))
        .map(|(source, _)| *source)
        .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Gemini API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (source, key) in candidates {
        if let Some(key) = key.filter(|k| is_valid_key(k)) {
            info!("Gemini API key loaded from {}", source);
            return Ok(key.trim().to_string());
        }
    }

    let toml_location = tphysio_common::config::default_config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "tphysio-ai.toml".to_string());

    Err(Error::Config(format!(
        "Gemini API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: {} (gemini_api_key = \"your-key\")",
        GEMINI_KEY_ENV, toml_location
    )))
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
