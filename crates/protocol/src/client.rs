//! Client → Pipeline messages

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Rejected analysis input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("provide either a diff or a pull request URL")]
    MissingInput,

    #[error("provide either a diff or a pull request URL, not both")]
    ConflictingInput,

    #[error("diff text is empty")]
    EmptyDiff,

    #[error("invalid GitHub pull request URL: {0} (expected https://github.com/owner/repo/pull/123)")]
    InvalidPrUrl(String),
}

/// The single message sent to the pipeline once the connection is open.
///
/// Serializes as exactly one of `{"diff_text": ...}` or `{"pr_url": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisRequest {
    DiffText(String),
    PrUrl(String),
}

impl AnalysisRequest {
    /// Build a request from optional form-style inputs.
    ///
    /// Blank values count as absent.
    pub fn from_parts(
        diff_text: Option<String>,
        pr_url: Option<String>,
    ) -> Result<Self, RequestError> {
        let diff_text = diff_text.filter(|d| !d.trim().is_empty());
        let pr_url = pr_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        match (diff_text, pr_url) {
            (Some(_), Some(_)) => Err(RequestError::ConflictingInput),
            (Some(diff), None) => Ok(AnalysisRequest::DiffText(diff)),
            (None, Some(url)) => {
                PrReference::parse(&url)?;
                Ok(AnalysisRequest::PrUrl(url))
            }
            (None, None) => Err(RequestError::MissingInput),
        }
    }

    /// Check a request built directly from its variants.
    pub fn validate(&self) -> Result<(), RequestError> {
        match self {
            AnalysisRequest::DiffText(diff) if diff.trim().is_empty() => {
                Err(RequestError::EmptyDiff)
            }
            AnalysisRequest::DiffText(_) => Ok(()),
            AnalysisRequest::PrUrl(url) => PrReference::parse(url).map(|_| ()),
        }
    }

    /// Short human label for logs and headers
    pub fn describe(&self) -> String {
        match self {
            AnalysisRequest::DiffText(diff) => format!("diff ({} lines)", diff.lines().count()),
            AnalysisRequest::PrUrl(url) => url.clone(),
        }
    }
}

/// Owner, repository and number parsed from a GitHub pull request URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrReference {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PrReference {
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        let invalid = || RequestError::InvalidPrUrl(raw.to_string());
        let url = Url::parse(raw.trim()).map_err(|_| invalid())?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str() != Some("github.com") {
            return Err(invalid());
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [owner, repo, "pull", number, ..] => {
                let number = number.parse::<u64>().map_err(|_| invalid())?;
                Ok(PrReference {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    number,
                })
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_single_field_object() {
        let diff = AnalysisRequest::DiffText("+a".to_string());
        assert_eq!(
            serde_json::to_string(&diff).unwrap(),
            r#"{"diff_text":"+a"}"#
        );

        let pr = AnalysisRequest::PrUrl("https://github.com/o/r/pull/1".to_string());
        assert_eq!(
            serde_json::to_string(&pr).unwrap(),
            r#"{"pr_url":"https://github.com/o/r/pull/1"}"#
        );
    }

    #[test]
    fn from_parts_requires_exactly_one_input() {
        assert_eq!(
            AnalysisRequest::from_parts(None, None),
            Err(RequestError::MissingInput)
        );
        assert_eq!(
            AnalysisRequest::from_parts(Some("   ".into()), Some("".into())),
            Err(RequestError::MissingInput)
        );
        assert_eq!(
            AnalysisRequest::from_parts(
                Some("+x".into()),
                Some("https://github.com/o/r/pull/2".into())
            ),
            Err(RequestError::ConflictingInput)
        );
        assert_eq!(
            AnalysisRequest::from_parts(Some("+x".into()), None),
            Ok(AnalysisRequest::DiffText("+x".into()))
        );
        assert_eq!(
            AnalysisRequest::from_parts(None, Some(" https://github.com/o/r/pull/2 ".into())),
            Ok(AnalysisRequest::PrUrl("https://github.com/o/r/pull/2".into()))
        );
    }

    #[test]
    fn validate_rejects_blank_diff_and_bad_urls() {
        assert_eq!(
            AnalysisRequest::DiffText("\n".into()).validate(),
            Err(RequestError::EmptyDiff)
        );
        assert!(AnalysisRequest::PrUrl("https://gitlab.com/o/r/pull/1".into())
            .validate()
            .is_err());
    }

    #[test]
    fn parses_pull_request_urls() {
        let reference = PrReference::parse("https://github.com/facebook/react/pull/12345").unwrap();
        assert_eq!(reference.owner, "facebook");
        assert_eq!(reference.repo, "react");
        assert_eq!(reference.number, 12345);

        assert!(PrReference::parse("https://github.com/facebook/react/pull/12345/files").is_ok());
        assert!(PrReference::parse("https://github.com/facebook/react/issues/1").is_err());
        assert!(PrReference::parse("https://github.com/facebook/react/pull/abc").is_err());
        assert!(PrReference::parse("ftp://github.com/facebook/react/pull/1").is_err());
        assert!(PrReference::parse("not a url").is_err());
    }
}
