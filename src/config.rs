//! One settings schema for every command: broker credentials and endpoints
//! from the environment (.env friendly), guard profiles from an optional
//! TOML file.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::Deserialize;

use crate::consts::{DEFAULT_BRIDGE_PORT, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use crate::error::{Error, Result};
use crate::protect::GuardProfile;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bridge_host: String,
    pub bridge_port: u16,
    pub login: u64,
    pub password: String,
    pub server: String,
    pub ollama_url: String,
    pub ollama_model: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            bridge_host: env::var("MT5_BRIDGE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            bridge_port: match env::var("MT5_BRIDGE_PORT") {
                Ok(raw) => raw.parse().map_err(|_| {
                    Error::Config(format!("MT5_BRIDGE_PORT is not a port number: {}", raw))
                })?,
                Err(_) => DEFAULT_BRIDGE_PORT,
            },
            login: required("MT5_LOGIN")?
                .parse()
                .map_err(|_| Error::Config("MT5_LOGIN must be numeric".to_string()))?,
            password: required("MT5_PASSWORD")?,
            server: required("MT5_SERVER")?,
            ollama_url: env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string()),
            ollama_model: env::var("OLLAMA_MODEL")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string()),
        })
    }
}

fn required(var: &str) -> Result<String> {
    env::var(var).map_err(|_| Error::Env(var.to_string()))
}

/// Extra guard profiles, keyed by name:
///
/// ```toml
/// [profiles.scalp]
/// trigger_pips = 6.0
/// trail_pips = 4.0
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ProfileFile {
    #[serde(default)]
    pub profiles: HashMap<String, GuardProfile>,
}

pub fn load_profiles(path: Option<&Path>) -> Result<ProfileFile> {
    let Some(path) = path else {
        return Ok(ProfileFile::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// A file profile shadows a built-in preset of the same name.
pub fn resolve_profile(name: &str, file: &ProfileFile) -> Result<GuardProfile> {
    if let Some(profile) = file.profiles.get(name) {
        return Ok(*profile);
    }
    GuardProfile::named(name)
        .ok_or_else(|| Error::Config(format!("unknown guard profile '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_file_overrides_defaults_per_field() {
        let file: ProfileFile = toml::from_str(
            r#"
            [profiles.scalp]
            trigger_pips = 6.0
            trail_pips = 4.0
            "#,
        )
        .unwrap();
        let scalp = file.profiles["scalp"];
        assert_eq!(scalp.trigger_pips, 6.0);
        assert_eq!(scalp.trail_pips, 4.0);
        //unlisted fields keep the balanced defaults
        assert_eq!(scalp.atr_period, 14);
    }

    #[test]
    fn test_resolve_prefers_file_then_presets() {
        let file: ProfileFile = toml::from_str(
            r#"
            [profiles.fast]
            trigger_pips = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(resolve_profile("fast", &file).unwrap().trigger_pips, 5.0);
        assert_eq!(
            resolve_profile("conservative", &file).unwrap().trigger_pips,
            30.0
        );
        assert!(resolve_profile("nope", &file).is_err());
    }

    #[test]
    fn test_missing_env_is_a_typed_error() {
        let err = required("MT5_TEST_VAR_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, Error::Env(_)));
    }
}
