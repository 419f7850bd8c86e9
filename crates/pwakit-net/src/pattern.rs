//! Substring patterns over serialized URLs.

use std::fmt;

use crate::Url;

/// Matches any URL whose serialized form contains a fixed segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    segment: String,
}

impl UrlPattern {
    pub fn contains(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
        }
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.matches_str(url.as_str())
    }

    /// Match an already serialized URL, as stored in a cache entry.
    pub fn matches_str(&self, url: &str) -> bool {
        !self.segment.is_empty() && url.contains(&self.segment)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*{}*", self.segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_segment() {
        let pattern = UrlPattern::contains("/orders/submit");
        assert!(pattern.matches_str("https://shop.test/orders/submit/42"));
        assert!(pattern.matches_str("https://shop.test/orders/submit"));
        assert!(pattern.matches(&Url::parse("https://shop.test/api/orders/submit?x=1").unwrap()));
        assert!(!pattern.matches_str("https://shop.test/orders/42"));
        assert_eq!(pattern.to_string(), "*/orders/submit*");
    }

    #[test]
    fn test_empty_segment_matches_nothing() {
        let pattern = UrlPattern::contains("");
        assert!(!pattern.matches_str("https://shop.test/"));
    }
}
