//! Relevance filter — cheap pre-LLM check for rental listings.
//!
//! A message qualifies when its text starts with the tag token, or contains
//! any keyword token. Matching is case-insensitive.

use tracing::debug;

use crate::config::FilterConfig;

/// Tag/keyword relevance filter.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    tag: String,
    keywords: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            tag: config.tag.to_lowercase(),
            keywords: config
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Does this text look like a rental listing?
    pub fn is_relevant(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        if !self.tag.is_empty() && lower.starts_with(&self.tag) {
            return true;
        }
        let matched = self.keywords.iter().any(|k| lower.contains(k.as_str()));
        if !matched {
            debug!(len = text.len(), "Message did not match relevance filter");
        }
        matched
    }
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_prefix_matches() {
        let filter = RelevanceFilter::default();
        assert!(filter.is_relevant("#offro camera singola in via Pascoli"));
        assert!(filter.is_relevant("#OFFRO Stanza doppia"));
    }

    #[test]
    fn keyword_anywhere_matches() {
        let filter = RelevanceFilter::default();
        assert!(filter.is_relevant("Room offered near Politecnico"));
        assert!(filter.is_relevant("Ciao! Offro posto letto"));
    }

    #[test]
    fn unrelated_text_is_rejected() {
        let filter = RelevanceFilter::default();
        assert!(!filter.is_relevant("#cerco stanza a Città Studi"));
        assert!(!filter.is_relevant(""));
    }

    #[test]
    fn custom_keywords_are_data_driven() {
        let filter = RelevanceFilter::new(&FilterConfig {
            tag: "#affitto".into(),
            keywords: vec!["Sublet".into()],
        });
        assert!(filter.is_relevant("#affitto bilocale"));
        assert!(filter.is_relevant("summer SUBLET available"));
        assert!(!filter.is_relevant("#offro stanza"));
    }

    #[test]
    fn empty_tag_does_not_match_everything() {
        let filter = RelevanceFilter::new(&FilterConfig {
            tag: String::new(),
            keywords: vec![],
        });
        assert!(!filter.is_relevant("anything at all"));
    }
}
