mod config;
mod download;
mod energy;
mod format;
mod inference;
mod logging;
mod photo;
mod pipeline;
mod recommendation;
mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ParseMode, PhotoSize};
use teloxide::utils::command::BotCommands as _; // bring trait into scope for descriptions()
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::download::{download_telegram_file, fetch_with_retry, RetryPolicy};
use crate::energy::PersonalEnergyProfile;
use crate::format::{split_message, Reply};
use crate::inference::InferenceClient;
use crate::photo::ImageNormalizer;
use crate::pipeline::{
    deliver_or_apologize, AnalysisContext, Pipeline, ProgressSink, Stage, GENERIC_FAILURE,
};
use crate::session::{birth_year_from_caption, CaptionYear, Prompt, SessionState, Transition};

type SessionDialogue = Dialogue<SessionState, InMemStorage<SessionState>>;

const TELEGRAM_MAX_LEN: usize = 4096;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI args for --config-json
    let mut config_json_arg: Option<String> = None;
    for arg in std::env::args().skip(1) {
        if let Some(rest) = arg.strip_prefix("--config-json=") {
            config_json_arg = Some(rest.to_string());
            break;
        }
        if arg == "--config-json" {
            // support next-arg form
            config_json_arg = std::env::args().skip_while(|a| a != "--config-json").nth(1);
            break;
        }
    }

    let config = match config_json_arg {
        Some(json) => Config::from_json_str(&json).context("failed to parse --config-json")?,
        None => Config::load().context("failed to load config")?,
    };
    logging::init_logging(config.log_level.as_deref());
    info!(
        vision_model = %config.vision_model,
        text_model = %config.text_model,
        max_mb = config.max_image_size_mb,
        max_dim = config.max_image_dimension,
        quality = config.jpeg_quality,
        "Config loaded"
    );

    let client = InferenceClient::from_config(&config).context("failed to build http client")?;
    let pipeline = Arc::new(Pipeline::new(ImageNormalizer::from_config(&config), client));
    let retry = RetryPolicy {
        max_attempts: config.download_max_attempts,
        ..RetryPolicy::default()
    };

    let bot = Bot::new(config.teloxide_token.clone());

    // Log bot identity
    match bot.get_me().await {
        Ok(me) => {
            info!(
                id = me.id.0,
                username = me.user.username.as_deref().unwrap_or(""),
                "Bot started"
            );
        }
        Err(err) => warn!(error = %err, "Failed to fetch bot info"),
    }

    let handler = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<SessionState>, SessionState>()
        .branch(
            dptree::entry()
                .filter_command::<BotCommand>()
                .endpoint(handle_commands),
        )
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo))
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![
            InMemStorage::<SessionState>::new(),
            pipeline,
            retry
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

#[derive(Debug, teloxide::macros::BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
enum BotCommand {
    #[command(description = "Show help")]
    Help,
    #[command(description = "Start a personalized analysis")]
    Start,
    #[command(description = "Cancel the current analysis")]
    Cancel,
}

fn current_year() -> i32 {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .year()
}

async fn handle_commands(
    bot: Bot,
    msg: Message,
    cmd: BotCommand,
    dialogue: SessionDialogue,
) -> Result<()> {
    info!(chat_id = %msg.chat.id, from = ?msg.from.as_ref().map(|u| u.id.0), command = ?cmd, "Command received");
    match cmd {
        BotCommand::Help => {
            let text = format!(
                "{}\n\nSend a photo of a room (optionally with your birth year as the caption) for quick Feng Shui advice, or use /start to enter your birth details step by step for a personalized analysis.",
                BotCommand::descriptions()
            );
            debug!(len = text.len(), "Sending help");
            bot.send_message(msg.chat.id, text).await?;
        }
        BotCommand::Start => {
            let (state, prompt) = SessionState::start();
            dialogue.update(state).await?;
            bot.send_message(
                msg.chat.id,
                format!("🏮 Welcome to PeaceScape AI! 🏮\n\n{}", prompt.text()),
            )
            .await?;
        }
        BotCommand::Cancel => {
            dialogue.exit().await?;
            info!(chat_id = %msg.chat.id, "Session cancelled");
            bot.send_message(msg.chat.id, "Operation cancelled.").await?;
        }
    }
    Ok(())
}

async fn handle_text(bot: Bot, msg: Message, dialogue: SessionDialogue) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let state = dialogue.get_or_default().await?;
    let prompt = match state.on_text(text, current_year()) {
        Transition::Advance(next, prompt) => {
            debug!(chat_id = %msg.chat.id, ?next, "Session advanced");
            dialogue.update(next).await?;
            prompt
        }
        Transition::Reprompt(prompt) => {
            debug!(chat_id = %msg.chat.id, ?state, ?prompt, "Input rejected");
            prompt
        }
    };
    bot.send_message(msg.chat.id, prompt.text()).await?;
    Ok(())
}

async fn handle_photo(
    bot: Bot,
    msg: Message,
    dialogue: SessionDialogue,
    pipeline: Arc<Pipeline>,
    retry: RetryPolicy,
) -> Result<()> {
    let state = dialogue.get_or_default().await?;
    let ctx = match state {
        SessionState::AwaitingPhoto(details) => AnalysisContext {
            profile: Some(details.profile()),
            room_direction: Some(details.room_direction),
        },
        SessionState::Idle => {
            let year = match birth_year_from_caption(msg.caption()) {
                CaptionYear::Year(year) => Some(year),
                CaptionYear::Absent => None,
                CaptionYear::Invalid => {
                    bot.send_message(
                        msg.chat.id,
                        "Please provide a valid birth year as the photo caption for personalized recommendations.",
                    )
                    .await?;
                    None
                }
            };
            AnalysisContext {
                profile: Some(PersonalEnergyProfile::from_year(year)),
                room_direction: None,
            }
        }
        other => {
            // Фото пришло посреди анкеты: повторяем текущий вопрос.
            let prompt = other.pending_prompt().unwrap_or(Prompt::AskPhoto);
            bot.send_message(
                msg.chat.id,
                format!("Let's finish your details first. {}", prompt.text()),
            )
            .await?;
            return Ok(());
        }
    };

    let guided = matches!(state, SessionState::AwaitingPhoto(_));
    let processing = bot
        .send_message(msg.chat.id, "🔄 Receiving your image...")
        .await?;
    let progress = ProgressMessage {
        bot: bot.clone(),
        chat_id: msg.chat.id,
        message_id: processing.id,
    };

    match analyze_photo(&bot, &msg, &pipeline, retry, &ctx, &progress).await {
        Ok(PhotoResult::Answered(reply)) => {
            // При неудачной отправке сессия остаётся, фото можно прислать снова.
            if deliver_or_apologize(&progress, &reply).await && guided {
                dialogue.exit().await?;
            }
        }
        Ok(PhotoResult::Rejected(reason)) => {
            // Сессия остаётся в ожидании фото.
            progress.replace(&format!("⚠️ {}", reason)).await?;
        }
        Err(err) => {
            error!(chat_id = %msg.chat.id, error = ?err, "Photo analysis failed");
            progress.fail(GENERIC_FAILURE).await;
        }
    }
    Ok(())
}

enum PhotoResult {
    Answered(Reply),
    Rejected(String),
}

async fn analyze_photo(
    bot: &Bot,
    msg: &Message,
    pipeline: &Pipeline,
    retry: RetryPolicy,
    ctx: &AnalysisContext,
    progress: &ProgressMessage,
) -> Result<PhotoResult> {
    let Some(photos) = msg.photo() else {
        return Ok(PhotoResult::Rejected("No photo found.".to_string()));
    };
    // Choose the biggest photo variant
    let Some(best): Option<&PhotoSize> = photos
        .iter()
        .max_by_key(|p| p.width as i64 * p.height as i64)
    else {
        return Ok(PhotoResult::Rejected("No photo found.".to_string()));
    };

    info!(
        chat_id = %msg.chat.id,
        from = ?msg.from.as_ref().map(|u| u.id.0),
        count = photos.len(),
        chosen_w = best.width,
        chosen_h = best.height,
        file_id = %best.file.id,
        "Photo received"
    );

    let file_id = &best.file.id;
    let bytes = fetch_with_retry(retry, || download_telegram_file(bot, file_id))
        .await
        .context("failed to download image")?;
    debug!(size = bytes.len(), "Image downloaded");

    let image = match pipeline.prepare(&bytes) {
        Ok(image) => image,
        Err(err) => {
            warn!(chat_id = %msg.chat.id, error = %err, "Image rejected");
            return Ok(PhotoResult::Rejected(err.to_string()));
        }
    };

    debug!(
        width = image.width,
        height = image.height,
        jpeg_len = image.jpeg_len,
        "Image normalized"
    );

    let reply = pipeline.analyze(&image, ctx, progress).await;
    Ok(PhotoResult::Answered(reply))
}

/// Сообщение «идёт обработка», которое редактируется по ходу конвейера.
struct ProgressMessage {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl ProgressMessage {
    async fn replace(&self, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(self.chat_id, self.message_id, text)
            .await?;
        Ok(())
    }

    /// Первая часть ответа заменяет сообщение, остальные уходят отдельными.
    async fn finish(&self, reply: &Reply) -> Result<()> {
        let parts = split_message(&reply.text, TELEGRAM_MAX_LEN, reply.markdown);
        for (idx, part) in parts.iter().enumerate() {
            if idx == 0 {
                let mut req = self.bot.edit_message_text(self.chat_id, self.message_id, part);
                if reply.markdown {
                    req = req.parse_mode(ParseMode::MarkdownV2);
                }
                req.await?;
            } else {
                let mut req = self.bot.send_message(self.chat_id, part);
                if reply.markdown {
                    req = req.parse_mode(ParseMode::MarkdownV2);
                }
                req.await?;
            }
        }
        info!(chat_id = %self.chat_id, parts = parts.len(), markdown = reply.markdown, "Reply sent");
        Ok(())
    }
}

impl ProgressSink for ProgressMessage {
    async fn stage(&self, stage: Stage) {
        if let Err(err) = self.replace(stage.text()).await {
            warn!(error = %err, ?stage, "Failed to update progress message");
        }
        if let Err(err) = self.bot.send_chat_action(self.chat_id, ChatAction::Typing).await {
            debug!(error = %err, "send_chat_action failed");
        }
    }

    async fn deliver(&self, reply: &Reply) -> Result<()> {
        self.finish(reply).await
    }

    async fn fail(&self, text: &str) {
        if let Err(err) = self.replace(text).await {
            warn!(error = %err, "Failed to edit progress message, sending apology separately");
            if let Err(err) = self.bot.send_message(self.chat_id, text).await {
                error!(chat_id = %self.chat_id, error = %err, "Failed to send apology");
            }
        }
    }
}
