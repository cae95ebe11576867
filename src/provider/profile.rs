//! Named provider profiles as they appear in configuration files.

use crate::error::ProviderError;
use crate::provider::ModelProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider family behind a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "local")]
    LocalCustom,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Ollama => "ollama",
            ProviderType::LocalCustom => "local",
        }
    }

    /// Environment variable consulted when a profile carries no key.
    pub fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Gemini => Some("GEMINI_API_KEY"),
            ProviderType::Ollama | ProviderType::LocalCustom => None,
        }
    }

    pub fn requires_api_key(self) -> bool {
        self.default_api_key_env().is_some()
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" => Ok(ProviderType::Anthropic),
            "gemini" => Ok(ProviderType::Gemini),
            "ollama" => Ok(ProviderType::Ollama),
            "local" => Ok(ProviderType::LocalCustom),
            other => Err(format!(
                "Invalid provider type: {}. Must be one of: openai, anthropic, gemini, ollama, local",
                other
            )),
        }
    }
}

/// One `[providers.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Filled from the table key when omitted.
    #[serde(default)]
    pub provider_name: Option<String>,
    pub provider_type: ProviderType,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the provider's default key variable.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType, model: impl Into<String>) -> Self {
        Self {
            provider_name: None,
            provider_type,
            model: model.into(),
            api_key: None,
            api_key_env: None,
            endpoint: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            reqwest::Url::parse(endpoint)
                .map_err(|e| format!("Invalid endpoint URL '{}': {}", endpoint, e))?;
        }
        if self.provider_type == ProviderType::LocalCustom && self.endpoint.is_none() {
            return Err("Local provider requires an endpoint".to_string());
        }
        Ok(())
    }

    /// Key from the profile, then from its environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        let env_name = self
            .api_key_env
            .as_deref()
            .or_else(|| self.provider_type.default_api_key_env())?;
        std::env::var(env_name).ok().filter(|k| !k.is_empty())
    }

    pub fn to_model_provider(&self) -> Result<ModelProvider, ProviderError> {
        let model = self.model.clone();
        let require_key = || {
            self.resolve_api_key().ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "No API key for {} provider '{}' (set api_key or {})",
                    self.provider_type,
                    self.provider_name.as_deref().unwrap_or("unnamed"),
                    self.api_key_env
                        .as_deref()
                        .or_else(|| self.provider_type.default_api_key_env())
                        .unwrap_or("api_key_env"),
                ))
            })
        };

        match self.provider_type {
            ProviderType::OpenAI => Ok(ModelProvider::OpenAI {
                model,
                api_key: require_key()?,
                base_url: self.endpoint.clone(),
            }),
            ProviderType::Anthropic => Ok(ModelProvider::Anthropic {
                model,
                api_key: require_key()?,
                base_url: self.endpoint.clone(),
            }),
            ProviderType::Gemini => Ok(ModelProvider::Gemini {
                model,
                api_key: require_key()?,
                base_url: self.endpoint.clone(),
            }),
            ProviderType::Ollama => Ok(ModelProvider::Ollama {
                model,
                base_url: self.endpoint.clone(),
            }),
            ProviderType::LocalCustom => {
                let endpoint = self.endpoint.clone().ok_or_else(|| {
                    ProviderError::NotConfigured("Local provider requires an endpoint".to_string())
                })?;
                Ok(ModelProvider::LocalCustom {
                    model,
                    endpoint,
                    api_key: self.resolve_api_key(),
                })
            }
        }
    }
}
