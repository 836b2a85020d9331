use std::env;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use pylearn_core::LessonContext;
use pylearn_core::model::{TutorSettings, TutorSettingsDraft, TutorSettingsError};

use crate::error::TutorError;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a patient programming tutor. \
     Explain the current lesson briefly, relate it to what the learner has already seen, \
     and suggest how to approach the exercise without solving it.";

/// Generative text collaborator. Output is free text and is not parsed.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns `TutorError` when the backend cannot produce text.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, TutorError>;
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Read tutor settings from `PYLEARN_AI_API_KEY`, `PYLEARN_AI_BASE_URL` and `PYLEARN_AI_MODEL`.
///
/// # Errors
///
/// Returns `TutorSettingsError::MissingApiKey` when no key is set, or
/// `InvalidBaseUrl` when the base URL does not parse.
pub fn settings_from_env() -> Result<TutorSettings, TutorSettingsError> {
    TutorSettingsDraft {
        api_key: env::var("PYLEARN_AI_API_KEY").ok(),
        base_url: env::var("PYLEARN_AI_BASE_URL").ok(),
        model: env::var("PYLEARN_AI_MODEL").ok(),
        system_prompt: None,
    }
    .validate()
}

//
// ─── CHAT COMPLETIONS CLIENT ───────────────────────────────────────────────────
//

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    settings: TutorSettings,
}

impl ChatCompletionsClient {
    #[must_use]
    pub fn new(settings: TutorSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl ContentGenerator for ChatCompletionsClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, TutorError> {
        let url = format!("{}/chat/completions", self.settings.base_url());
        let payload = ChatRequest {
            model: self.settings.model().to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.4,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(self.settings.api_key())
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TutorError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(TutorError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Produces tutoring prose for the learner's current lesson.
#[derive(Clone)]
pub struct TutorService {
    generator: Option<Arc<dyn ContentGenerator>>,
    system_prompt: String,
}

impl TutorService {
    /// Configure from the environment. A missing or invalid configuration
    /// leaves the tutor disabled.
    #[must_use]
    pub fn from_env() -> Self {
        match settings_from_env() {
            Ok(settings) => {
                tracing::debug!(model = settings.model(), "tutor enabled");
                let system_prompt = settings
                    .system_prompt()
                    .unwrap_or(DEFAULT_SYSTEM_PROMPT)
                    .to_string();
                Self {
                    generator: Some(Arc::new(ChatCompletionsClient::new(settings))),
                    system_prompt,
                }
            }
            Err(TutorSettingsError::MissingApiKey) => Self::disabled(),
            Err(err) => {
                tracing::warn!(error = %err, "tutor disabled");
                Self::disabled()
            }
        }
    }

    #[must_use]
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            generator: Some(generator),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            generator: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Ask the generator for a short lesson brief.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::Disabled` when no generator is configured, or the
    /// generator's own error.
    pub async fn brief_for(&self, context: &LessonContext) -> Result<String, TutorError> {
        let generator = self.generator.as_ref().ok_or(TutorError::Disabled)?;
        let prompt = render_prompt(context);
        tracing::debug!(position = %context.position, chars = prompt.len(), "requesting brief");
        generator.generate(&self.system_prompt, &prompt).await
    }
}

/// Render the lesson context as the user message of a brief request.
#[must_use]
pub fn render_prompt(context: &LessonContext) -> String {
    let mut out = String::new();
    let progress = &context.progress;
    let _ = writeln!(out, "Module: {}", context.module_name);
    let _ = writeln!(out, "Lesson: {}", context.lesson_name);
    let _ = writeln!(out, "Learner level: {}", context.difficulty.as_str());
    let _ = writeln!(
        out,
        "Progress: lesson {} of {} ({}%)",
        progress.current_ordinal(),
        progress.total_lessons,
        progress.progress_percentage
    );

    if !context.objectives.is_empty() {
        let _ = writeln!(out, "\nObjectives:");
        for objective in &context.objectives {
            let _ = writeln!(out, "- {objective}");
        }
    }

    if !context.lesson_content.trim().is_empty() {
        let _ = writeln!(out, "\nLesson content:\n{}", context.lesson_content.trim());
    }

    let _ = writeln!(out, "\nExercise: {}", context.exercise.description);
    if !context.exercise.code_template.trim().is_empty() {
        let _ = writeln!(out, "Starter code:\n{}", context.exercise.code_template.trim_end());
    }

    if !context.previous_lessons.is_empty() {
        let _ = writeln!(out, "\nRecently covered: {}", context.previous_lessons.join("; "));
    }
    if !context.next_lessons.is_empty() {
        let _ = writeln!(out, "Coming up: {}", context.next_lessons.join("; "));
    }
    out
}
