use std::fmt::Display;

/// Copy shown for every failure; the error view does not distinguish kinds.
pub const NO_DATA_MESSAGE: &str = "কোনো তথ্য পাওয়া যায়নি!";

/// Why an analysis produced no result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("upstream model request failed: {message}")]
    Upstream { message: String },
    #[error("upstream payload is not JSON: {snippet}")]
    Parse { snippet: String },
    #[error("targeted search returned insufficient data")]
    InsufficientData,
}

impl AnalysisError {
    pub fn upstream(message: impl Display) -> Self {
        AnalysisError::Upstream {
            message: message.to_string(),
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::upstream(error_chain_text(err, 512))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Upstream { .. } => "upstream",
            AnalysisError::Parse { .. } => "parse",
            AnalysisError::InsufficientData => "insufficient_data",
        }
    }

    pub fn user_message(&self) -> &'static str {
        NO_DATA_MESSAGE
    }
}

/// A view-state transition the session refused.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("an analysis is already running")]
    Busy,
    #[error("start a new search before submitting another query")]
    NotIdle,
    #[error("provide a photo or some search text")]
    EmptyQuery,
    #[error("there is no result to act on")]
    NoResult,
    #[error("no offer at position {0}")]
    NoSuchOffer(usize),
    #[error("analysis ticket {0} is not the one in flight")]
    StalePending(u64),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::{error_chain_text, truncate_text, AnalysisError, NO_DATA_MESSAGE};

    #[test]
    fn every_kind_shares_the_same_user_message() {
        let errors = [
            AnalysisError::upstream("boom"),
            AnalysisError::Parse {
                snippet: "<html>".to_string(),
            },
            AnalysisError::InsufficientData,
        ];
        for err in errors {
            assert_eq!(err.user_message(), NO_DATA_MESSAGE);
        }
    }

    #[test]
    fn chain_text_joins_causes_without_repeats() {
        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("Gemini request failed")
            .unwrap_err();
        assert_eq!(
            error_chain_text(&err, 200),
            "Gemini request failed | caused by: connection refused"
        );
        let typed = AnalysisError::from_anyhow(&err);
        assert_eq!(typed.kind(), "upstream");
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
