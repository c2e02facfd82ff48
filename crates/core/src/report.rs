//! End-of-session evaluation report.
//!
//! The report type doubles as the JSON schema the backend is asked to fill,
//! so field names follow the camelCase wire format.

use crate::error::EvaluationError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a key moment helped or hurt the interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MomentKind {
    Positive,
    Negative,
}

/// A notable point in the conversation, quoted and commented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KeyMoment {
    #[serde(rename = "type")]
    pub kind: MomentKind,
    /// Position of the moment in the conversation, e.g. "第3轮".
    pub time: String,
    /// Stage label the moment belongs to.
    pub stage: String,
    /// Quoted trainee or customer line.
    pub content: String,
    /// Coach comment on the moment.
    pub comment: String,
}

/// Structured scoring of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    /// Overall score from 0 to 100.
    pub overall_score: f64,
    /// Empathy score from 0 to 100.
    pub empathy: f64,
    /// Logic score from 0 to 100.
    pub logic: f64,
    /// Efficiency score from 0 to 100.
    pub efficiency: f64,
    /// Compliance score from 0 to 100.
    pub compliance: f64,
    /// Professionalism score from 0 to 100.
    pub professionalism: f64,
    /// Free-text summary of the trainee's performance.
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    /// Notable moments in conversation order.
    pub key_moments: Vec<KeyMoment>,
}

impl EvaluationReport {
    /// JSON schema of the report, as sent to the backend.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(EvaluationReport))
            .unwrap_or(serde_json::Value::Null)
    }

    fn validate(&self) -> Result<(), EvaluationError> {
        let scores = [
            ("overallScore", self.overall_score),
            ("empathy", self.empathy),
            ("logic", self.logic),
            ("efficiency", self.efficiency),
            ("compliance", self.compliance),
            ("professionalism", self.professionalism),
        ];
        for (field, value) in scores {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(EvaluationError::OutOfRange {
                    field: field.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Parses and validates the backend's evaluation reply.
///
/// A surrounding markdown code fence is tolerated; anything else that is not
/// a complete report is an error.
pub fn parse_evaluation(raw: &str) -> Result<EvaluationReport, EvaluationError> {
    let body = strip_code_fence(raw);
    let report: EvaluationReport =
        serde_json::from_str(body).map_err(|e| EvaluationError::Malformed(e.to_string()))?;
    report.validate()?;
    Ok(report)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "overallScore": 82,
        "empathy": 90,
        "logic": 75,
        "efficiency": 70,
        "compliance": 88,
        "professionalism": 85,
        "summary": "整体表现良好",
        "strengths": ["及时道歉"],
        "weaknesses": ["方案不够具体"],
        "keyMoments": [
            {"type": "positive", "time": "第1轮", "stage": "EXPLORE", "content": "非常抱歉给您带来不便", "comment": "先处理情绪"}
        ]
    }"#;

    #[test]
    fn test_parse_valid_report() {
        let report = parse_evaluation(SAMPLE).unwrap();
        assert_eq!(report.overall_score, 82.0);
        assert_eq!(report.key_moments.len(), 1);
        assert_eq!(report.key_moments[0].kind, MomentKind::Positive);
        assert_eq!(report.strengths, vec!["及时道歉"]);
    }

    #[test]
    fn test_parse_fenced_report() {
        let fenced = format!("```json\n{}\n```", SAMPLE);
        assert!(parse_evaluation(&fenced).is_ok());
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value.as_object_mut().unwrap().remove("summary");
        let err = parse_evaluation(&value.to_string()).unwrap_err();
        assert!(matches!(err, EvaluationError::Malformed(_)));
    }

    #[test]
    fn test_optional_lists_default_to_empty() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("strengths");
        object.remove("weaknesses");
        let report = parse_evaluation(&value.to_string()).unwrap();
        assert!(report.strengths.is_empty());
        assert!(report.weaknesses.is_empty());
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let bad = SAMPLE.replace("\"overallScore\": 82", "\"overallScore\": 120");
        match parse_evaluation(&bad).unwrap_err() {
            EvaluationError::OutOfRange { field, value } => {
                assert_eq!(field, "overallScore");
                assert_eq!(value, 120.0);
            }
            other => panic!("Expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_non_json_is_rejected() {
        assert!(matches!(
            parse_evaluation("抱歉，我无法评估。"),
            Err(EvaluationError::Malformed(_))
        ));
    }

    #[test]
    fn test_schema_names_wire_fields() {
        let schema = EvaluationReport::json_schema().to_string();
        assert!(schema.contains("overallScore"));
        assert!(schema.contains("keyMoments"));
    }
}
