//! Общий конвейер для быстрого и пошагового режимов:
//! нормализация → описание → рекомендации → текст ответа.

use std::future::Future;

use tracing::{debug, error, info};

use crate::energy::{Direction, PersonalEnergyProfile};
use crate::format::{format_reply, Reply};
use crate::inference::{ChatBackend, GroqBackend, InferenceClient};
use crate::photo::{ImageNormalizer, NormalizedImage, NormalizeError};
use crate::recommendation::RecommendationOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Describing,
    Recommending,
}

impl Stage {
    pub fn text(self) -> &'static str {
        match self {
            Stage::Describing => "🔍 Describing the space...",
            Stage::Recommending => "✨ Generating Feng Shui recommendations...",
        }
    }
}

pub const GENERIC_FAILURE: &str = "❌ Sorry, something went wrong. Please try again later.";

/// Куда сообщать о переходе между этапами и куда отдавать итог.
pub trait ProgressSink: Send + Sync {
    fn stage(&self, stage: Stage) -> impl Future<Output = ()> + Send;

    /// Показывает готовый ответ целиком.
    fn deliver(&self, reply: &Reply) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Заменяет индикатор прогресса коротким сообщением об ошибке.
    fn fail(&self, text: &str) -> impl Future<Output = ()> + Send;
}

/// Ответ, который не удалось показать, заменяется извинением.
/// Возвращает `true`, если пользователь увидел ответ.
pub async fn deliver_or_apologize(progress: &impl ProgressSink, reply: &Reply) -> bool {
    match progress.deliver(reply).await {
        Ok(()) => true,
        Err(err) => {
            error!(error = ?err, markdown = reply.markdown, "pipeline: reply delivery failed");
            progress.fail(GENERIC_FAILURE).await;
            false
        }
    }
}

/// Данные о пользователе, известные к моменту анализа.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub profile: Option<PersonalEnergyProfile>,
    pub room_direction: Option<Direction>,
}

pub struct Pipeline<B = GroqBackend> {
    normalizer: ImageNormalizer,
    client: InferenceClient<B>,
}

impl<B: ChatBackend> Pipeline<B> {
    pub fn new(normalizer: ImageNormalizer, client: InferenceClient<B>) -> Self {
        Self { normalizer, client }
    }

    pub fn prepare(&self, raw: &[u8]) -> Result<NormalizedImage, NormalizeError> {
        self.normalizer.normalize(raw)
    }

    /// Два последовательных вызова модели. Ошибки сервиса уже заменены внутри клиента.
    pub async fn analyze(
        &self,
        image: &NormalizedImage,
        ctx: &AnalysisContext,
        progress: &impl ProgressSink,
    ) -> Reply {
        progress.stage(Stage::Describing).await;
        let analysis = self
            .client
            .describe(image, ctx.profile.as_ref(), ctx.room_direction)
            .await;
        debug!(len = analysis.len(), "pipeline: analysis ready");

        progress.stage(Stage::Recommending).await;
        let outcome = self
            .client
            .recommend(&analysis, ctx.profile.as_ref(), ctx.room_direction)
            .await;
        let structured = matches!(outcome, RecommendationOutcome::Structured(_));
        info!(structured, "pipeline: recommendations ready");

        format_reply(&outcome, ctx.profile.as_ref())
    }
}
