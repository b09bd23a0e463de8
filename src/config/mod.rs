// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::cache::disk::validate_profile;
use crate::cache::{CacheConfig, CacheError, CacheManager, EvictionPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub experimental_features: ExperimentalFeatures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Profiles can opt out of the shared disk cache
    #[serde(default = "default_caching_enabled")]
    pub caching_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_provider: Option<StorageProviderConfig>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            caching_enabled: default_caching_enabled(),
            storage_provider: None,
        }
    }
}

fn default_caching_enabled() -> bool {
    true
}

/// Backend selection, interpreted by the provider adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(default)]
    pub options: HashMap<String, serde_yaml::Value>,
}

/// Opt-in switches for features that are not stable yet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentalFeatures {
    /// Allow the MRU eviction policy
    #[serde(default)]
    pub cache_mru_eviction: bool,
    /// Allow a non-zero eviction purge_factor
    #[serde(default)]
    pub cache_purge_factor: bool,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        let mut missing = Vec::new();
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing.push(var_name.to_string());
                    String::new()
                }
            }
        });
        if let Some(var_name) = missing.first() {
            return Err(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            ));
        }

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        for name in self.profiles.keys() {
            validate_profile(name).map_err(|e| e.to_string())?;
        }

        if let Some(cache) = &self.cache {
            cache.validate().map_err(|e| e.to_string())?;

            let eviction = &cache.eviction_policy;
            if eviction.policy == EvictionPolicy::Mru
                && !self.experimental_features.cache_mru_eviction
            {
                return Err(
                    "Eviction policy 'mru' is experimental; enable experimental_features.cache_mru_eviction"
                        .to_string(),
                );
            }
            if eviction.purge_factor != 0 && !self.experimental_features.cache_purge_factor {
                return Err(
                    "purge_factor is experimental; enable experimental_features.cache_purge_factor"
                        .to_string(),
                );
            }
        }

        Ok(())
    }

    /// Disk cache for `profile`, if caching applies to it
    ///
    /// The whole config is validated first, so experimental cache options
    /// only take effect when their feature flag is set.
    pub fn cache_manager(&self, profile: &str) -> Result<Option<CacheManager>, CacheError> {
        self.validate().map_err(CacheError::Config)?;
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let enabled = self
            .profiles
            .get(profile)
            .map_or(true, |p| p.caching_enabled);
        if !enabled {
            return Ok(None);
        }
        CacheManager::new(profile, cache.clone()).map(Some)
    }
}
