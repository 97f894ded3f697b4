use teloxide::utils::markdown::{bold, escape};

use crate::energy::{Direction, PersonalEnergyProfile};
use crate::recommendation::{RecommendationOutcome, RecommendationResult, SpaceAnalysis};

/// Текст ответа и признак разметки (MarkdownV2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markdown: bool,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
        }
    }
}

fn join_directions(directions: &[Direction]) -> String {
    directions
        .iter()
        .map(|d| d.code())
        .collect::<Vec<_>>()
        .join(", ")
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn push_profile(out: &mut String, profile: &PersonalEnergyProfile) {
    out.push_str(&bold("Personal Energy Profile"));
    out.push('\n');
    out.push_str(&escape(&format!("Element: {}", profile.element)));
    out.push('\n');
    if let Some(kua) = profile.kua_number {
        out.push_str(&escape(&format!("Kua Number: {}", kua)));
        out.push('\n');
    }
    if !profile.lucky_directions.is_empty() {
        out.push_str(&escape(&format!(
            "Lucky Directions: {}",
            join_directions(&profile.lucky_directions)
        )));
        out.push('\n');
    }
    if !profile.challenging_directions.is_empty() {
        out.push_str(&escape(&format!(
            "Challenging Directions: {}",
            join_directions(&profile.challenging_directions)
        )));
        out.push('\n');
    }
    out.push('\n');
}

fn push_space_analysis(out: &mut String, analysis: &SpaceAnalysis) {
    out.push_str(&bold("Room Analysis"));
    out.push('\n');
    if let Some(flow) = analysis
        .current_energy_flow
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        out.push_str(&escape(flow.trim()));
        out.push('\n');
    }
    if !analysis.problem_areas.is_empty() {
        out.push_str(&escape(&format!(
            "Problem areas: {}",
            analysis.problem_areas.join(", ")
        )));
        out.push('\n');
    }
    if !analysis.positive_features.is_empty() {
        out.push_str(&escape(&format!(
            "Positive features: {}",
            analysis.positive_features.join(", ")
        )));
        out.push('\n');
    }
    out.push('\n');
}

/// Собирает MarkdownV2-сообщение; весь текст модели экранируется.
/// Профиль, в котором ничего не известно, не выводится.
pub fn format_structured(
    result: &RecommendationResult,
    profile: Option<&PersonalEnergyProfile>,
) -> String {
    let mut out = String::new();
    if let Some(profile) = profile.filter(|p| p.is_known()) {
        push_profile(&mut out, profile);
    }

    out.push_str(&bold("Room Description"));
    out.push('\n');
    out.push_str(&escape(result.description.trim()));
    out.push_str("\n\n");

    if let Some(analysis) = result.space_analysis.as_ref().filter(|a| !a.is_empty()) {
        push_space_analysis(&mut out, analysis);
    }

    out.push_str(&bold("Feng Shui Recommendations"));
    out.push_str("\n\n");
    if result.recommendations.is_empty() {
        out.push_str(&escape("No specific changes needed."));
        out.push('\n');
    }
    for rec in &result.recommendations {
        out.push_str(&bold(&escape(&capitalize(rec.aspect.trim()))));
        if let Some(priority) = &rec.priority {
            out.push_str(&escape(&format!(" (Priority: {})", priority)));
        }
        out.push('\n');
        if let Some(issue) = rec.issue.as_deref().filter(|s| !s.trim().is_empty()) {
            out.push_str(&escape(&format!("Issue: {}", issue.trim())));
            out.push('\n');
        }
        out.push_str(&escape(rec.advice.trim()));
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

/// Режет длинный ответ по абзацам, чтобы каждая часть влезла в `limit` символов.
/// Абзац длиннее лимита режется по `safe_cut`.
pub fn split_message(text: &str, limit: usize, markdown: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n") {
        let candidate_len = if current.is_empty() {
            paragraph.chars().count()
        } else {
            current.chars().count() + 2 + paragraph.chars().count()
        };
        if candidate_len <= limit {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }
        if !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        let chars: Vec<char> = paragraph.chars().collect();
        let mut rest = chars.as_slice();
        while rest.len() > limit {
            let cut = safe_cut(rest, limit, markdown);
            parts.push(rest[..cut].iter().collect());
            rest = &rest[cut..];
        }
        current = rest.iter().collect();
    }
    if !current.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

/// Позиция разреза не дальше `limit`. В MarkdownV2 разрез не попадает
/// между `\` и экранируемым символом и внутрь `*...*`. По возможности режем по переводу строки.
fn safe_cut(chars: &[char], limit: usize, markdown: bool) -> usize {
    let mut safe = 0;
    let mut line = 0;
    let mut bold = false;
    let mut i = 0;
    while i < limit {
        let step = if markdown && chars[i] == '\\' { 2 } else { 1 };
        if markdown && chars[i] == '*' {
            bold = !bold;
        }
        i += step;
        if i > limit {
            break;
        }
        if !bold {
            safe = i;
            if chars[i - 1] == '\n' {
                line = i;
            }
        }
    }
    if line > 0 {
        line
    } else if safe > 0 {
        safe
    } else {
        limit
    }
}

/// Структурированный ответ идёт с разметкой, деградированный как обычный текст.
pub fn format_reply(
    outcome: &RecommendationOutcome,
    profile: Option<&PersonalEnergyProfile>,
) -> Reply {
    match outcome {
        RecommendationOutcome::Structured(result) => Reply {
            text: format_structured(result, profile),
            markdown: true,
        },
        RecommendationOutcome::Degraded(degraded) => match degraded.raw.as_deref() {
            Some(raw) => Reply::plain(raw),
            None => Reply::plain(degraded.error.clone()),
        },
    }
}
