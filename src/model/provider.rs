//! Provider identity and parsing utilities.

use std::fmt;
use std::str::FromStr;

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    DeepSeek,
    OpenRouter,
    Perplexity,
    Mistral,
    Ollama,
    LmStudio,
    Groq,
    Gemini,
    Xai,
    Custom,
}

impl ProviderId {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::Perplexity => "perplexity",
            ProviderId::Mistral => "mistral",
            ProviderId::Ollama => "ollama",
            ProviderId::LmStudio => "lmstudio",
            ProviderId::Groq => "groq",
            ProviderId::Gemini => "gemini",
            ProviderId::Xai => "xai",
            ProviderId::Custom => "custom",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenAi,
            ProviderId::Anthropic,
            ProviderId::DeepSeek,
            ProviderId::OpenRouter,
            ProviderId::Perplexity,
            ProviderId::Mistral,
            ProviderId::Ollama,
            ProviderId::LmStudio,
            ProviderId::Groq,
            ProviderId::Gemini,
            ProviderId::Xai,
            ProviderId::Custom,
        ]
    }

    /// Family whose adapter this provider reuses unmodified, if any.
    pub const fn inherits(&self) -> Option<ProviderId> {
        match self {
            ProviderId::LmStudio
            | ProviderId::Groq
            | ProviderId::Gemini
            | ProviderId::Xai
            | ProviderId::Custom => Some(ProviderId::OpenAi),
            _ => None,
        }
    }

    /// The family that actually builds and parses requests for this provider.
    pub const fn adapter_family(&self) -> ProviderId {
        match self.inherits() {
            Some(parent) => parent,
            None => *self,
        }
    }

    pub const fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderId::OpenAi => Some("https://api.openai.com/v1"),
            ProviderId::Anthropic => Some("https://api.anthropic.com/v1"),
            ProviderId::DeepSeek => Some("https://api.deepseek.com"),
            ProviderId::OpenRouter => Some("https://openrouter.ai/api/v1"),
            ProviderId::Perplexity => Some("https://api.perplexity.ai"),
            ProviderId::Mistral => Some("https://api.mistral.ai/v1"),
            ProviderId::Ollama => Some("http://localhost:11434"),
            ProviderId::LmStudio => Some("http://localhost:1234/v1"),
            ProviderId::Groq => Some("https://api.groq.com/openai/v1"),
            ProviderId::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            ProviderId::Xai => Some("https://api.x.ai/v1"),
            ProviderId::Custom => None,
        }
    }

    /// Local servers accept requests without a key.
    pub const fn requires_api_key(&self) -> bool {
        !matches!(
            self,
            ProviderId::Ollama | ProviderId::LmStudio | ProviderId::Custom
        )
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "chatgpt" => Ok(ProviderId::OpenAi),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "deepseek" => Ok(ProviderId::DeepSeek),
            "openrouter" => Ok(ProviderId::OpenRouter),
            "perplexity" => Ok(ProviderId::Perplexity),
            "mistral" => Ok(ProviderId::Mistral),
            "ollama" => Ok(ProviderId::Ollama),
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(ProviderId::LmStudio),
            "groq" => Ok(ProviderId::Groq),
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "xai" | "grok" => Ok(ProviderId::Xai),
            "custom" | "openai-compatible" => Ok(ProviderId::Custom),
            _ => Err(format!("unknown provider: {}", s)),
        }
    }
}

impl serde::Serialize for ProviderId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ProviderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ProviderId::from_str(&s).map_err(serde::de::Error::custom)
    }
}
