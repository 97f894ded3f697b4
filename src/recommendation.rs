//! Схема JSON-ответа текстовой модели и его разбор.
//! Любое отклонение от схемы считается битым JSON и даёт `Degraded`.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const JSON_FAILURE_MESSAGE: &str = "Failed to generate recommendations in JSON format.";
pub const SERVICE_FAILURE_MESSAGE: &str =
    "Failed to generate recommendations. Please try again later.";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecommendationResult {
    #[serde(alias = "overview")]
    pub description: String,
    #[serde(default)]
    pub space_analysis: Option<SpaceAnalysis>,
    #[serde(alias = "feng_shui_recommendations")]
    pub recommendations: Vec<Recommendation>,
}

/// Разбор энергии помещения. Необязательный блок: его отсутствие не делает ответ битым.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SpaceAnalysis {
    #[serde(default)]
    pub current_energy_flow: Option<String>,
    #[serde(default)]
    pub problem_areas: Vec<String>,
    #[serde(default)]
    pub positive_features: Vec<String>,
}

impl SpaceAnalysis {
    pub fn is_empty(&self) -> bool {
        self.current_energy_flow
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
            && self.problem_areas.is_empty()
            && self.positive_features.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Recommendation {
    #[serde(alias = "category")]
    pub aspect: String,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(alias = "solution")]
    pub advice: String,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Модели присылают приоритет и числом, и словом ("High").
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Priority {
    Rank(i64),
    Label(String),
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Rank(n) => write!(f, "{}", n),
            Priority::Label(s) => f.write_str(s),
        }
    }
}

/// Замена результата, когда структурированный ответ получить не удалось.
#[derive(Debug, Clone, PartialEq)]
pub struct DegradedResult {
    pub error: String,
    /// Сырой текст модели, если ответ пришёл, но не разобрался.
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecommendationOutcome {
    Structured(RecommendationResult),
    Degraded(DegradedResult),
}

impl RecommendationOutcome {
    pub fn service_failure() -> Self {
        RecommendationOutcome::Degraded(DegradedResult {
            error: SERVICE_FAILURE_MESSAGE.to_string(),
            raw: None,
        })
    }
}

/// Строгий разбор ответа модели. Никогда не паникует.
pub fn parse_recommendation(text: &str) -> RecommendationOutcome {
    match serde_json::from_str::<RecommendationResult>(text.trim()) {
        Ok(result) => RecommendationOutcome::Structured(result),
        Err(err) => {
            tracing::warn!(error = %err, len = text.len(), "recommendation: json parse failed");
            let raw = text.trim();
            RecommendationOutcome::Degraded(DegradedResult {
                error: JSON_FAILURE_MESSAGE.to_string(),
                raw: (!raw.is_empty()).then(|| raw.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_json_keeps_values() {
        let text = r#"{
            "description": "Bright living room with a desk facing the wall.",
            "recommendations": [
                {"aspect": "layout", "advice": "Turn the desk to face the door.", "priority": 1},
                {"category": "colors", "issue": "Too much red", "solution": "Add blue accents", "priority": "High"}
            ]
        }"#;
        let RecommendationOutcome::Structured(result) = parse_recommendation(text) else {
            panic!("expected structured result");
        };
        assert_eq!(result.description, "Bright living room with a desk facing the wall.");
        assert_eq!(result.recommendations.len(), 2);
        assert_eq!(result.recommendations[0].aspect, "layout");
        assert_eq!(result.recommendations[0].priority, Some(Priority::Rank(1)));
        assert_eq!(result.recommendations[1].aspect, "colors");
        assert_eq!(result.recommendations[1].issue.as_deref(), Some("Too much red"));
        assert_eq!(result.recommendations[1].advice, "Add blue accents");
        assert_eq!(
            result.recommendations[1].priority,
            Some(Priority::Label("High".into()))
        );
    }

    #[test]
    fn space_analysis_is_optional() {
        let text = r#"{
            "description": "Cluttered bedroom",
            "space_analysis": {
                "current_energy_flow": "Chi is blocked near the door.",
                "problem_areas": ["Bed under the window", "Clutter"],
                "positive_features": ["Natural light"]
            },
            "recommendations": []
        }"#;
        let RecommendationOutcome::Structured(result) = parse_recommendation(text) else {
            panic!("expected structured result");
        };
        let analysis = result.space_analysis.unwrap();
        assert_eq!(
            analysis.current_energy_flow.as_deref(),
            Some("Chi is blocked near the door.")
        );
        assert_eq!(analysis.problem_areas, vec!["Bed under the window", "Clutter"]);
        assert_eq!(analysis.positive_features, vec!["Natural light"]);

        let partial = r#"{"description":"x","space_analysis":{"problem_areas":["Clutter"]},"recommendations":[]}"#;
        let RecommendationOutcome::Structured(result) = parse_recommendation(partial) else {
            panic!("expected structured result");
        };
        let analysis = result.space_analysis.unwrap();
        assert_eq!(analysis.current_energy_flow, None);
        assert!(!analysis.is_empty());

        let without = r#"{"description":"x","recommendations":[]}"#;
        let RecommendationOutcome::Structured(result) = parse_recommendation(without) else {
            panic!("expected structured result");
        };
        assert_eq!(result.space_analysis, None);
    }

    #[test]
    fn single_shot_schema_aliases_are_accepted() {
        let text = r#"{"description":"Small room","feng_shui_recommendations":[{"aspect":"decor","advice":"Add a plant"}]}"#;
        assert!(matches!(
            parse_recommendation(text),
            RecommendationOutcome::Structured(_)
        ));
    }

    #[test]
    fn malformed_json_degrades_with_raw_text() {
        let outcome = parse_recommendation("Sure! Here are some tips: {broken");
        assert_eq!(
            outcome,
            RecommendationOutcome::Degraded(DegradedResult {
                error: JSON_FAILURE_MESSAGE.to_string(),
                raw: Some("Sure! Here are some tips: {broken".to_string()),
            })
        );
    }

    #[test]
    fn schema_deviation_is_treated_as_malformed() {
        // нет description
        let missing = r#"{"recommendations": []}"#;
        // advice не строка
        let wrong_type = r#"{"description": "x", "recommendations": [{"aspect": "a", "advice": 5}]}"#;
        for text in [missing, wrong_type, "", "[]"] {
            assert!(matches!(
                parse_recommendation(text),
                RecommendationOutcome::Degraded(DegradedResult { ref error, .. }) if error == JSON_FAILURE_MESSAGE
            ));
        }
    }
}
