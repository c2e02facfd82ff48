//! Coach advice and its legacy `comment | tag,tag` reply format.

use crate::error::AdviceFormatError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Comment shown before the trainee's first reply.
pub const PLACEHOLDER_COMMENT: &str = "点击开始对话，我将为您提供实时指导。";
/// Comment used when the coach reply cannot be parsed.
pub const FALLBACK_COMMENT: &str = "导师暂时无法解析本轮回复，请继续保持对话。";
/// Tag attached to fallback advice.
pub const FALLBACK_TAG: &str = "解析失败";

/// Short stage-aware feedback on the trainee's latest reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CoachAdvice {
    pub comment: String,
    pub tags: Vec<String>,
}

impl CoachAdvice {
    pub fn placeholder() -> Self {
        Self {
            comment: PLACEHOLDER_COMMENT.to_string(),
            tags: vec![],
        }
    }

    pub fn fallback() -> Self {
        Self {
            comment: FALLBACK_COMMENT.to_string(),
            tags: vec![FALLBACK_TAG.to_string()],
        }
    }

    /// Parses a coach reply, degrading to [`CoachAdvice::fallback`] when it
    /// is malformed.
    pub fn from_reply(raw: &str) -> Self {
        parse_advice(raw).unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default coach advice");
            Self::fallback()
        })
    }
}

/// Strictly parses `"<comment> | <tag1>,<tag2>"`.
///
/// Splits on the first `|`. Without a `|` the whole reply is the comment and
/// the tag list is empty. A blank comment is an error.
pub fn parse_advice(raw: &str) -> Result<CoachAdvice, AdviceFormatError> {
    let (comment, tags) = match raw.split_once('|') {
        Some((comment, tags)) => (comment, Some(tags)),
        None => (raw, None),
    };

    let comment = comment.trim().trim_matches('"').trim();
    if comment.is_empty() {
        return Err(AdviceFormatError(format!("no comment in {:?}", raw)));
    }

    let tags = tags
        .map(|segment| {
            segment
                .split([',', '，'])
                .map(|tag| tag.trim().trim_matches('"').trim_start_matches('#').trim())
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(CoachAdvice {
        comment: comment.to_string(),
        tags,
    })
}
