use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use url::Url;

/// The canonical identifier of a Composer symphony.
///
/// Ordered so that batch results keyed by it iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(String);

impl StrategyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StrategyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StrategyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for StrategyId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Normalizes a symphony reference (a bare id or a symphony URL) to its id.
///
/// Both `/symphony/{id}` and `/symphony/{id}/details` paths are understood.
/// References without any `/` are returned trimmed.
pub fn resolve(reference: &str) -> Result<StrategyId, CoreError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidReference(format!(
            "empty reference {reference:?}"
        )));
    }

    if !trimmed.contains('/') {
        return Ok(StrategyId::new(trimmed));
    }

    let path = reference_path(trimmed)?;
    let segments: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();

    match segments.as_slice() {
        [] => Err(CoreError::InvalidReference(format!("no path in {trimmed}"))),
        [.., id, "details"] => Ok(StrategyId::new(*id)),
        [.., last] => Ok(StrategyId::new(*last)),
    }
}

/// Extracts the path component of an absolute URL, or treats a scheme-less
/// reference as a bare path with its query and fragment removed.
fn reference_path(reference: &str) -> Result<String, CoreError> {
    match Url::parse(reference) {
        Ok(url) => Ok(url.path().to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let end = reference.find(['?', '#']).unwrap_or(reference.len());
            Ok(reference[..end].to_string())
        }
        Err(e) => Err(CoreError::InvalidReference(format!(
            "failed to parse {reference}: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ids_are_trimmed() {
        for raw in ["abc123", "  abc123 ", "\tXyZ-9_q\n", "details"] {
            assert_eq!(resolve(raw).unwrap().as_str(), raw.trim());
        }
    }

    #[test]
    fn details_url_yields_the_preceding_segment() {
        let id = resolve("https://app.composer.trade/symphony/abc123/details").unwrap();
        assert_eq!(id, StrategyId::from("abc123"));
    }

    #[test]
    fn plain_symphony_url_yields_the_last_segment() {
        let id = resolve("https://app.composer.trade/symphony/abc123").unwrap();
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn trailing_slash_query_and_fragment_are_ignored() {
        assert_eq!(
            resolve("https://app.composer.trade/symphony/abc123/?share=1#top").unwrap().as_str(),
            "abc123"
        );
        assert_eq!(resolve("symphony/abc123/details?x=1").unwrap().as_str(), "abc123");
    }

    #[test]
    fn empty_references_are_rejected() {
        assert!(matches!(resolve(""), Err(CoreError::InvalidReference(_))));
        assert!(matches!(resolve("   "), Err(CoreError::InvalidReference(_))));
    }

    #[test]
    fn references_without_path_segments_are_rejected() {
        assert!(matches!(resolve("///"), Err(CoreError::InvalidReference(_))));
        assert!(matches!(
            resolve("https://app.composer.trade/"),
            Err(CoreError::InvalidReference(_))
        ));
    }

    #[test]
    fn unparseable_urls_are_rejected() {
        assert!(matches!(
            resolve("http://[::1/symphony/abc"),
            Err(CoreError::InvalidReference(_))
        ));
    }
}
