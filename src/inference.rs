//! Клиент к Groq (OpenAI-совместимый Chat Completions): описание фото
//! vision-моделью и структурированные рекомендации текстовой моделью.

use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::energy::{Direction, PersonalEnergyProfile};
use crate::logging::compact;
use crate::photo::NormalizedImage;
use crate::recommendation::{parse_recommendation, RecommendationOutcome};

pub const VISION_FALLBACK: &str = "Vision analysis failed. Please try again later.";

/// Параметры сэмплинга одного вызова модели.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

pub const VISION_SAMPLING: Sampling = Sampling {
    temperature: 0.7,
    max_tokens: 1024,
};

pub const TEXT_SAMPLING: Sampling = Sampling {
    temperature: 0.6,
    max_tokens: 1024,
};

const DESCRIBE_PROMPT: &str =
    "Please describe the room's layout, colors, decor, and general energy flow.";

static RECOMMENDATION_SCHEMA: Lazy<String> = Lazy::new(|| {
    let schema = json!({
        "description": "string (overview of the room layout and feel)",
        "space_analysis": {
            "current_energy_flow": "string (how chi moves through the room)",
            "problem_areas": ["string"],
            "positive_features": ["string"]
        },
        "recommendations": [
            {
                "aspect": "string (e.g. layout, colors, decor, energy flow)",
                "issue": "string (what is wrong, optional)",
                "advice": "string (specific Feng Shui recommendation)",
                "priority": "integer 1-5 (optional, 1 is most urgent)"
            }
        ]
    });
    format!("{:#}", schema)
});

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("inference service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference response missing content")]
    MissingContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object",
        }
    }
}

/// Тело запроса `POST /v1/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    pub fn new(model: &str, messages: Vec<ChatMessage>, sampling: Sampling) -> Self {
        Self {
            model: model.to_string(),
            messages,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            response_format: None,
        }
    }

    pub fn json_only(mut self) -> Self {
        self.response_format = Some(ResponseFormat::json_object());
        self
    }
}

/// Транспорт до сервиса моделей. Возвращает текст ассистента.
pub trait ChatBackend: Send + Sync {
    fn chat_completion(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<String, InferenceError>> + Send;
}

#[derive(Debug, Clone)]
pub struct GroqBackend {
    http: reqwest::Client,
    base: String,
    api_key: String,
}

impl GroqBackend {
    pub fn new(base: &str, api_key: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl ChatBackend for GroqBackend {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            json = request.response_format.is_some(),
            "inference: request"
        );
        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            warn!(
                status = %status,
                body = %compact(&body, 200),
                "inference: service error"
            );
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: compact(&body, 500),
            });
        }

        let val: Value = serde_json::from_str(&body).map_err(|err| {
            warn!(error = %err, body = %compact(&body, 200), "inference: response is not json");
            InferenceError::MissingContent
        })?;
        let content = extract_content(&val)?;
        debug!(model = %request.model, len = content.len(), "inference: response");
        Ok(content)
    }
}

/// Достаёт `choices[0].message.content`.
fn extract_content(val: &Value) -> Result<String, InferenceError> {
    val["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or(InferenceError::MissingContent)
}

pub struct InferenceClient<B = GroqBackend> {
    backend: B,
    vision_model: String,
    text_model: String,
}

impl InferenceClient<GroqBackend> {
    pub fn from_config(cfg: &Config) -> Result<Self, InferenceError> {
        let backend = GroqBackend::new(
            &cfg.groq_base,
            &cfg.groq_api_key,
            Duration::from_secs(cfg.inference_timeout_secs),
        )?;
        Ok(Self::new(backend, &cfg.vision_model, &cfg.text_model))
    }
}

impl<B: ChatBackend> InferenceClient<B> {
    pub fn new(backend: B, vision_model: &str, text_model: &str) -> Self {
        Self {
            backend,
            vision_model: vision_model.to_string(),
            text_model: text_model.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    pub fn describe_request(
        &self,
        image: &NormalizedImage,
        profile: Option<&PersonalEnergyProfile>,
        room_direction: Option<Direction>,
    ) -> ChatRequest {
        let mut instruction = match profile {
            Some(profile) => format!(
                "{} Analyze based on user's personal energy: {}",
                DESCRIBE_PROMPT,
                profile_json(profile)
            ),
            None => DESCRIBE_PROMPT.to_string(),
        };
        if let Some(direction) = room_direction {
            instruction.push_str(&format!(" The room faces {}.", direction));
        }
        let message = ChatMessage {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: instruction },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                },
            ]),
        };
        ChatRequest::new(&self.vision_model, vec![message], VISION_SAMPLING)
    }

    pub fn recommend_request(
        &self,
        analysis: &str,
        profile: Option<&PersonalEnergyProfile>,
        room_direction: Option<Direction>,
    ) -> ChatRequest {
        let mut system = String::from(
            "You are a Feng Shui expert providing detailed descriptions and Feng Shui recommendations.\n",
        );
        if let Some(profile) = profile {
            system.push_str(&format!(
                "The user's Feng Shui element is {}.\n",
                profile.element
            ));
        }
        system.push_str(&format!(
            "Respond with a single JSON object using the schema: {}",
            RECOMMENDATION_SCHEMA.as_str()
        ));

        let mut user = format!("Based on this analysis: {}\n\n", analysis);
        if let Some(profile) = profile {
            user.push_str(&format!("User's personal energy: {}\n", profile_json(profile)));
        }
        if let Some(direction) = room_direction {
            user.push_str(&format!("The room faces {}.\n", direction));
        }
        user.push_str("Provide specific Feng Shui recommendations tailored to the user's energy.");

        ChatRequest::new(
            &self.text_model,
            vec![
                ChatMessage::text(Role::System, system),
                ChatMessage::text(Role::User, user),
            ],
            TEXT_SAMPLING,
        )
        .json_only()
    }

    /// Описание фото. Любая ошибка заменяется на `VISION_FALLBACK`.
    pub async fn describe(
        &self,
        image: &NormalizedImage,
        profile: Option<&PersonalEnergyProfile>,
        room_direction: Option<Direction>,
    ) -> String {
        let request = self.describe_request(image, profile, room_direction);
        match self.backend.chat_completion(&request).await {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, model = %self.vision_model, "inference: vision analysis failed");
                VISION_FALLBACK.to_string()
            }
        }
    }

    /// Рекомендации в JSON. Без повторов: ошибка сразу превращается в `Degraded`.
    pub async fn recommend(
        &self,
        analysis: &str,
        profile: Option<&PersonalEnergyProfile>,
        room_direction: Option<Direction>,
    ) -> RecommendationOutcome {
        let request = self.recommend_request(analysis, profile, room_direction);
        match self.backend.chat_completion(&request).await {
            Ok(text) => parse_recommendation(&text),
            Err(err) => {
                error!(error = %err, model = %self.text_model, "inference: recommendation failed");
                RecommendationOutcome::service_failure()
            }
        }
    }
}

fn profile_json(profile: &PersonalEnergyProfile) -> String {
    serde_json::to_string(profile).unwrap_or_else(|_| format!("{:?}", profile))
}
