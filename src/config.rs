use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

/// Переменные окружения, которые понимает `Config::load`, и поле, в которое они попадают.
/// `TELOXIDE_TOKEN` идёт после `TELEGRAM_BOT_TOKEN`, чтобы перекрыть его.
const ENV_KEYS: &[(&str, &str)] = &[
    ("TELEGRAM_BOT_TOKEN", "teloxide_token"),
    ("TELOXIDE_TOKEN", "teloxide_token"),
    ("GROQ_API_KEY", "groq_api_key"),
    ("GROQ_BASE", "groq_base"),
    ("MAX_IMAGE_SIZE_MB", "max_image_size_mb"),
    ("MAX_IMAGE_DIMENSION", "max_image_dimension"),
    ("JPEG_QUALITY", "jpeg_quality"),
    ("VISION_MODEL", "vision_model"),
    ("TEXT_MODEL", "text_model"),
    ("DOWNLOAD_MAX_ATTEMPTS", "download_max_attempts"),
    ("INFERENCE_TIMEOUT_SECS", "inference_timeout_secs"),
    ("LOG_LEVEL", "log_level"),
];

/// Алиасы, которые встречаются только в JSON-файле конфига.
const FILE_ALIASES: &[(&str, &str)] = &[("telegram_token", "teloxide_token")];

/// Числовые ключи: из окружения приходят строками, в JSON нужны числа.
const NUMERIC_KEYS: &[&str] = &[
    "MAX_IMAGE_SIZE_MB",
    "MAX_IMAGE_DIMENSION",
    "JPEG_QUALITY",
    "DOWNLOAD_MAX_ATTEMPTS",
    "INFERENCE_TIMEOUT_SECS",
];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(
        alias = "TELOXIDE_TOKEN",
        alias = "TELEGRAM_BOT_TOKEN",
        alias = "telegram_token"
    )]
    pub teloxide_token: String,
    #[serde(alias = "GROQ_API_KEY")]
    pub groq_api_key: String,
    #[serde(alias = "GROQ_BASE", default = "default_groq_base")]
    pub groq_base: String,
    #[serde(alias = "MAX_IMAGE_SIZE_MB", default = "default_max_image_size_mb")]
    pub max_image_size_mb: f64,
    #[serde(alias = "MAX_IMAGE_DIMENSION", default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
    #[serde(alias = "JPEG_QUALITY", default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(alias = "VISION_MODEL", default = "default_vision_model")]
    pub vision_model: String,
    #[serde(alias = "TEXT_MODEL", default = "default_text_model")]
    pub text_model: String,
    #[serde(
        alias = "DOWNLOAD_MAX_ATTEMPTS",
        default = "default_download_max_attempts"
    )]
    pub download_max_attempts: u32,
    #[serde(
        alias = "INFERENCE_TIMEOUT_SECS",
        default = "default_inference_timeout_secs"
    )]
    pub inference_timeout_secs: u64,
    #[serde(alias = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

fn default_groq_base() -> String {
    "https://api.groq.com/openai".to_string()
}

fn default_max_image_size_mb() -> f64 {
    4.0
}

fn default_max_image_dimension() -> u32 {
    2048
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_vision_model() -> String {
    "llama-3.2-90b-vision-preview".to_string()
}

fn default_text_model() -> String {
    "llama-3.2-3b-preview".to_string()
}

fn default_download_max_attempts() -> u32 {
    3
}

fn default_inference_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Собирает конфиг из переменных окружения (после `dotenvy`).
    /// Если задан `CONFIG_PATH`, значения из JSON-файла берутся за основу,
    /// а окружение их перекрывает.
    pub fn load() -> Result<Self> {
        let mut map = match std::env::var("CONFIG_PATH") {
            Ok(path) => read_json_object(&path)?,
            Err(_) => serde_json::Map::new(),
        };
        for (env_key, field) in ENV_KEYS {
            if let Ok(value) = std::env::var(env_key) {
                merge_env(&mut map, env_key, field, &value)?;
            }
        }
        Self::from_map(map)
    }

    /// Разбирает конфиг из JSON-строки (аргумент `--config-json`).
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(raw).context("некорректный JSON конфига")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let cfg: Config = serde_json::from_value(serde_json::Value::Object(map))
            .context("не заданы обязательные параметры (TELOXIDE_TOKEN, GROQ_API_KEY)")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.teloxide_token.trim().is_empty() {
            bail!("TELOXIDE_TOKEN пустой");
        }
        if self.groq_api_key.trim().is_empty() {
            bail!("GROQ_API_KEY пустой");
        }
        if !(self.max_image_size_mb > 0.0) {
            bail!("MAX_IMAGE_SIZE_MB должен быть больше нуля");
        }
        if self.max_image_dimension == 0 {
            bail!("MAX_IMAGE_DIMENSION должен быть больше нуля");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("JPEG_QUALITY должен быть в диапазоне 1..=100");
        }
        if self.download_max_attempts == 0 {
            bail!("DOWNLOAD_MAX_ATTEMPTS должен быть больше нуля");
        }
        Ok(())
    }
}

/// Кладёт значение из окружения под каноническое имя поля, убирая алиасы
/// этого же поля: serde считает два алиаса одного поля дубликатом.
fn merge_env(
    map: &mut serde_json::Map<String, serde_json::Value>,
    env_key: &str,
    field: &str,
    raw: &str,
) -> Result<()> {
    for (alias, _) in ENV_KEYS
        .iter()
        .chain(FILE_ALIASES)
        .filter(|(_, f)| *f == field)
    {
        map.remove(*alias);
    }
    map.insert(field.to_string(), env_value(env_key, raw)?);
    Ok(())
}

fn env_value(key: &str, raw: &str) -> Result<serde_json::Value> {
    if !NUMERIC_KEYS.contains(&key) {
        return Ok(serde_json::Value::String(raw.to_string()));
    }
    let number: serde_json::Number = raw
        .trim()
        .parse()
        .with_context(|| format!("{} должен быть числом: {}", key, raw))?;
    Ok(serde_json::Value::Number(number))
}

fn read_json_object(path: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("не удалось прочитать config: {}", path))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("некорректный JSON: {}", path))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("config {} должен быть JSON-объектом", path),
    }
}
