use thiserror::Error;
use url::Url;

pub const DEFAULT_TUTOR_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TUTOR_MODEL: &str = "gpt-4o-mini";

/// Connection settings for the hosted model that writes tutoring prose.
#[derive(Clone, PartialEq, Eq)]
pub struct TutorSettings {
    api_key: String,
    base_url: String,
    model: String,
    system_prompt: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TutorSettingsDraft {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TutorSettingsError {
    #[error("tutor API key is missing")]
    MissingApiKey,
    #[error("invalid base URL")]
    InvalidBaseUrl,
}

impl TutorSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize the draft.
    ///
    /// # Errors
    ///
    /// Returns `TutorSettingsError::MissingApiKey` if no key is set and
    /// `TutorSettingsError::InvalidBaseUrl` if the base URL does not parse.
    pub fn validate(self) -> Result<TutorSettings, TutorSettingsError> {
        let api_key = normalize_optional(self.api_key).ok_or(TutorSettingsError::MissingApiKey)?;
        let base_url = normalize_optional(self.base_url)
            .unwrap_or_else(|| DEFAULT_TUTOR_BASE_URL.to_string());
        let model =
            normalize_optional(self.model).unwrap_or_else(|| DEFAULT_TUTOR_MODEL.to_string());
        let system_prompt = normalize_optional(self.system_prompt);

        if Url::parse(&base_url).is_err() {
            return Err(TutorSettingsError::InvalidBaseUrl);
        }

        Ok(TutorSettings {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            system_prompt,
        })
    }
}

impl TutorSettings {
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }
}

impl std::fmt::Debug for TutorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TutorSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt.is_some())
            .finish_non_exhaustive()
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
