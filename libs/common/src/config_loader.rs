//! Configuration loading helpers
//!
//! Layered loading with figment: serialized defaults, then an optional YAML
//! file, then prefixed environment variables. Nested keys in the environment
//! use a double underscore, e.g. `HAPI_MQTT__BROKER_PORT=1884`.

use std::path::Path;

use errors::{HapiError, HapiResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

/// Separator between nested keys in environment variable names
pub const ENV_KEY_SEPARATOR: &str = "__";

/// Build the layered figment for a configuration type
///
/// A missing file is not an error: defaults and the environment still apply.
pub fn figment_for<T>(path: Option<&Path>, env_prefix: &str) -> Figment
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            figment = figment.merge(Yaml::file(path));
        } else {
            warn!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
        }
    }

    figment.merge(Env::prefixed(env_prefix).split(ENV_KEY_SEPARATOR))
}

/// Load a configuration type from defaults, file and environment
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> HapiResult<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    figment_for::<T>(path, env_prefix)
        .extract()
        .map_err(|e| HapiError::configuration(format!("Failed to load configuration: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        inner: Inner,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Inner {
        port: u16,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".into(),
                inner: Inner { port: 1883 },
            }
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let cfg: Sample = load_config(Some(Path::new("does-not-exist.yaml")), "SAMPLE_")
                .map_err(|e| e.to_string())?;
            assert_eq!(cfg, Sample::default());
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("sample.yaml", "name: from-file\ninner:\n  port: 2000\n")?;
            jail.set_env("SAMPLE_INNER__PORT", "3000");

            let cfg: Sample = load_config(Some(Path::new("sample.yaml")), "SAMPLE_")
                .map_err(|e| e.to_string())?;
            assert_eq!(cfg.name, "from-file");
            assert_eq!(cfg.inner.port, 3000);
            Ok(())
        });
    }
}
