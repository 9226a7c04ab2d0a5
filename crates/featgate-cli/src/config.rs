use anyhow::{Context, Result};
use featgate_core::VerifyConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "featgate.toml";

/// The featgate configuration file structure (featgate.toml)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeatgateConfig {
    /// Verification settings, same keys as the `verify` command flags
    pub verify: VerifyConfig,
}

impl FeatgateConfig {
    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load configuration from featgate.toml, searching upward from the given directory
    pub fn load(start_dir: &Path) -> Result<Option<(PathBuf, Self)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE);
            if config_path.is_file() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config_path, config)));
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    /// Load configuration by searching upward from the current working directory
    pub fn load_from_cwd() -> Result<Option<(PathBuf, Self)>> {
        let cwd = std::env::current_dir()?;
        Self::load(&cwd)
    }
}

/// Resolve the settings for a run: explicit file or upward search, then environment
pub fn resolve(explicit: Option<&Path>) -> Result<VerifyConfig> {
    let loaded = match explicit {
        Some(path) => Some((path.to_path_buf(), FeatgateConfig::from_file(path)?)),
        None => FeatgateConfig::load_from_cwd()?,
    };

    let mut config = match loaded {
        Some((path, file)) => {
            log::debug!("Using configuration {}", path.display());
            file.verify
        }
        None => VerifyConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use featgate_core::FailurePolicy;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config() {
        let config: FeatgateConfig = toml::from_str("").unwrap();
        assert!(config.verify.descriptors.is_empty());
        assert_eq!(config.verify.fail, FailurePolicy::End);
    }

    #[test]
    fn test_parse_verify_section() {
        let toml = r#"
[verify]
descriptors = ["mvn:org.example/features/1.0/json/features"]
features = ["core*", "!core-test"]
framework = ["framework"]
javase = "11"
fail = "first"
verify-transitive = true
max-concurrent-downloads = 4
"#;
        let config: FeatgateConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.verify.descriptors.len(), 1);
        assert_eq!(config.verify.features, vec!["core*", "!core-test"]);
        assert_eq!(config.verify.javase.as_deref(), Some("11"));
        assert_eq!(config.verify.fail, FailurePolicy::First);
        assert!(config.verify.verify_transitive);
        assert_eq!(config.verify.max_concurrent_downloads, 4);
    }

    #[test]
    fn test_load_searches_upward() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[verify]\ndescriptors = [\"file:/features.json\"]\n",
        )
        .unwrap();

        let (path, config) = FeatgateConfig::load(&nested).unwrap().unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE));
        assert_eq!(config.verify.descriptors, vec!["file:/features.json"]);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[verify]\nfail = \"sometimes\"\n").unwrap();
        assert!(FeatgateConfig::from_file(&path).is_err());
    }
}
