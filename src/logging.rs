use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,reqwest=warn,teloxide=info";

/// Инициализирует `tracing`: `RUST_LOG` важнее `LOG_LEVEL` из конфига.
pub fn init_logging(log_level: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| log_level.and_then(|v| EnvFilter::try_new(v.trim()).ok()))
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .compact()
        .init();
}

/// Укорачивает строку для вывода в поле лога.
pub fn compact(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let mut s = value.chars().take(max).collect::<String>();
        s.push_str("...");
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_keeps_short_values() {
        assert_eq!(compact("abc", 5), "abc");
    }

    #[test]
    fn compact_counts_chars_not_bytes() {
        assert_eq!(compact("фэншуй", 3), "фэн...");
    }
}
