//! Structured-evaluation extraction from free-form model output.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed-schema comparison of a reference analysis and a user analysis.
///
/// The serialized field names are a wire contract inherited from the upstream
/// evaluation schema and must not change. A record is always fully populated:
/// either parsed from model output or produced by [`EvaluationRecord::fallback`].
/// Value ranges are not validated; whatever numbers and strings the model
/// supplied are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Rating awarded to the reference (AI) analysis.
    #[serde(rename = "calificacionIA")]
    pub ai_rating: f64,
    /// Rating awarded to the user analysis.
    #[serde(rename = "calificacionUsuario")]
    pub user_rating: f64,
    /// Evaluator confidence in the reference analysis.
    #[serde(rename = "confianzaIA")]
    pub ai_confidence: f64,
    /// Evaluator confidence in the user analysis.
    #[serde(rename = "confianzaUsuario")]
    pub user_confidence: f64,
    /// Free-text overall commentary.
    #[serde(rename = "comentarioGeneral")]
    pub overall_comment: String,
    /// Strengths attributed to the reference analysis.
    #[serde(rename = "fortalezasIA")]
    pub ai_strengths: Vec<String>,
    /// Weaknesses attributed to the reference analysis.
    #[serde(rename = "debilidadesIA")]
    pub ai_weaknesses: Vec<String>,
    /// Strengths attributed to the user analysis.
    #[serde(rename = "fortalezasUsuario")]
    pub user_strengths: Vec<String>,
    /// Weaknesses attributed to the user analysis.
    #[serde(rename = "debilidadesUsuario")]
    pub user_weaknesses: Vec<String>,
    /// Free-text improvement recommendation for the user.
    #[serde(rename = "recomendacionMejora")]
    pub improvement: String,
}

impl EvaluationRecord {
    /// Documented default returned whenever extraction fails.
    pub fn fallback() -> Self {
        Self {
            ai_rating: 7.0,
            user_rating: 6.0,
            ai_confidence: 85.0,
            user_confidence: 70.0,
            overall_comment: "No se pudo extraer una evaluación estructurada.".to_string(),
            ai_strengths: vec!["Análisis estructurado".to_string()],
            ai_weaknesses: vec!["No especificado".to_string()],
            user_strengths: vec!["Perspectiva personal".to_string()],
            user_weaknesses: vec!["No especificado".to_string()],
            improvement: "Revisa la estructura y contenido de tu análisis para mejorar la \
                          calificación."
                .to_string(),
        }
    }
}

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("json fence regex"));

/// Extracts an [`EvaluationRecord`] from free-form model text.
///
/// Candidate payloads are tried in a fixed order: the interior of a
/// ` ```json ` fenced block, then the greedy first-`{`-to-last-`}` substring,
/// then the raw text itself. Any parse failure (malformed syntax, wrong
/// shape) yields [`EvaluationRecord::fallback`]. This function never fails;
/// downstream consumers must not special-case extraction failure.
pub fn extract_evaluation(raw: &str) -> EvaluationRecord {
    let candidate = candidate_payload(raw);
    match serde_json::from_str(candidate) {
        Ok(record) => record,
        Err(err) => {
            debug!(error = %err, "structured evaluation parse failed; using fallback record");
            EvaluationRecord::fallback()
        }
    }
}

fn candidate_payload(raw: &str) -> &str {
    if let Some(captures) = JSON_FENCE.captures(raw) {
        if let Some(interior) = captures.get(1) {
            return interior.as_str();
        }
    }
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            return &raw[start..=end];
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PAYLOAD: &str = r#"{
        "calificacionIA": 8.5,
        "calificacionUsuario": 7.5,
        "confianzaIA": 90,
        "confianzaUsuario": 80,
        "comentarioGeneral": "Ambos análisis son sólidos.",
        "fortalezasIA": ["Cobertura de cláusulas"],
        "debilidadesIA": ["Poca concreción"],
        "fortalezasUsuario": ["Perspectiva práctica"],
        "debilidadesUsuario": ["Estructura débil"],
        "recomendacionMejora": "Cita cláusulas específicas."
    }"#;

    #[test]
    fn fenced_block_content_is_returned_verbatim() {
        let raw = format!("Here is my evaluation:\n```json\n{VALID_PAYLOAD}\n```\nThanks.");
        let record = extract_evaluation(&raw);
        assert_eq!(record.ai_rating, 8.5);
        assert_eq!(record.user_rating, 7.5);
        assert_eq!(record.ai_confidence, 90.0);
        assert_eq!(record.overall_comment, "Ambos análisis son sólidos.");
        assert_eq!(record.ai_strengths, vec!["Cobertura de cláusulas"]);
    }

    #[test]
    fn bare_braced_object_is_found_without_a_fence() {
        let raw = format!("Some preamble before {VALID_PAYLOAD} and a trailing remark");
        let record = extract_evaluation(&raw);
        assert_eq!(record.ai_rating, 8.5);
    }

    #[test]
    fn fenced_block_wins_over_surrounding_braces() {
        let raw = format!("{{\"unrelated\": true}}\n```json\n{VALID_PAYLOAD}\n```");
        let record = extract_evaluation(&raw);
        assert_eq!(record.ai_rating, 8.5);
    }

    #[test]
    fn plain_prose_yields_the_documented_default() {
        let record = extract_evaluation("The user did reasonably well overall.");
        assert_eq!(record, EvaluationRecord::fallback());
        assert_eq!(record.ai_rating, 7.0);
        assert_eq!(record.user_rating, 6.0);
        assert_eq!(record.ai_confidence, 85.0);
        assert_eq!(record.user_confidence, 70.0);
        assert_eq!(record.ai_strengths.len(), 1);
        assert_eq!(record.user_weaknesses.len(), 1);
    }

    #[test]
    fn truncated_json_yields_the_default_without_panicking() {
        let raw = "```json\n{\"calificacionIA\": 8.5, \"calificacionUsuario\"\n```";
        assert_eq!(extract_evaluation(raw), EvaluationRecord::fallback());
    }

    #[test]
    fn wrong_shape_yields_the_default() {
        let raw = r#"{"calificacionIA": "not even close"}"#;
        assert_eq!(extract_evaluation(raw), EvaluationRecord::fallback());
    }

    #[test]
    fn reversed_braces_fall_through_to_the_default() {
        let raw = "} backwards { with no object at all";
        assert_eq!(extract_evaluation(raw), EvaluationRecord::fallback());
    }

    #[test]
    fn serialized_record_uses_the_wire_keys() {
        let json = serde_json::to_string(&EvaluationRecord::fallback()).expect("serialize");
        assert!(json.contains("\"calificacionIA\""));
        assert!(json.contains("\"recomendacionMejora\""));
        assert!(!json.contains("ai_rating"));
    }
}
