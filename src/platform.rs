use crate::types::PlatformKey;

/// Lower-case `name`, drop any directory part and trailing extension, and
/// collapse runs of spaces, hyphens and underscores into a single `_`.
pub fn normalize_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name).trim();
    let stem = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && !ext.contains(' ') => stem,
        _ => base,
    };
    normalize_key(stem)
}

/// Lower-case `key` and collapse separators like [`normalize_name`], but keep
/// dots: a configured key is never a file name.
pub fn normalize_key(key: &str) -> String {
    let mut normalized = String::with_capacity(key.len());
    let mut pending_separator = false;
    for c in key.trim().chars().flat_map(char::to_lowercase) {
        if matches!(c, ' ' | '-' | '_') {
            pending_separator = !normalized.is_empty();
        } else {
            if pending_separator {
                normalized.push('_');
                pending_separator = false;
            }
            normalized.push(c);
        }
    }
    normalized
}

/// Resolves upload file names to configured platforms.
#[derive(Debug, Clone)]
pub struct PlatformMatcher {
    keys: Vec<PlatformKey>,
}

impl PlatformMatcher {
    /// `keys` are tried in order; the first one contained in a name wins.
    pub fn new(keys: impl IntoIterator<Item = PlatformKey>) -> Self {
        let mut unique: Vec<PlatformKey> = Vec::new();
        for key in keys {
            if !key.as_str().is_empty() && !unique.contains(&key) {
                unique.push(key);
            }
        }
        Self { keys: unique }
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(names.iter().map(|n| PlatformKey::new(n.as_ref())))
    }

    pub fn keys(&self) -> &[PlatformKey] {
        &self.keys
    }

    pub fn match_name(&self, name: &str) -> Option<&PlatformKey> {
        let normalized = normalize_name(name);
        self.keys
            .iter()
            .find(|key| normalized.contains(key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> PlatformMatcher {
        PlatformMatcher::from_names(&[
            "amazon_us",
            "ebay",
            "amazon_de",
            "amazon_uk",
            "amazon_ca",
            "amazon_au",
        ])
    }

    #[test]
    fn normalize_strips_extension_and_separators() {
        assert_eq!(normalize_name("Amazon US.csv"), "amazon_us");
        assert_eq!(normalize_name("amazon--us  export.CSV"), "amazon_us_export");
        assert_eq!(normalize_name("uploads/ebay-june.csv"), "ebay_june");
        assert_eq!(normalize_name("  _ebay_ "), "ebay");
        assert_eq!(normalize_name("no_extension"), "no_extension");
        assert_eq!(normalize_name(".csv"), ".csv");
    }

    #[test]
    fn matches_anywhere_in_name() {
        let m = matcher();
        assert_eq!(m.match_name("ebay.csv").map(|k| k.as_str()), Some("ebay"));
        assert_eq!(
            m.match_name("June Amazon-UK keywords.csv").map(|k| k.as_str()),
            Some("amazon_uk")
        );
        assert_eq!(
            m.match_name("AMAZON_AU.csv").map(|k| k.as_str()),
            Some("amazon_au")
        );
    }

    #[test]
    fn unmatched_name_returns_none() {
        let m = matcher();
        assert!(m.match_name("randomfile.csv").is_none());
        assert!(m.match_name("amazon.csv").is_none());
        assert!(m.match_name("").is_none());
    }

    #[test]
    fn first_configured_key_wins() {
        let m = matcher();
        assert_eq!(
            m.match_name("ebay_vs_amazon_us.csv").map(|k| k.as_str()),
            Some("amazon_us")
        );

        let reversed = PlatformMatcher::from_names(&["ebay", "amazon_us"]);
        assert_eq!(
            reversed
                .match_name("ebay_vs_amazon_us.csv")
                .map(|k| k.as_str()),
            Some("ebay")
        );
    }

    #[test]
    fn dotted_keys_keep_their_dot() {
        assert_eq!(PlatformKey::new("Amazon.com").as_str(), "amazon.com");

        let m = PlatformMatcher::from_names(&["amazon.com", "amazon"]);
        assert_eq!(
            m.match_name("amazon.com june.csv").map(|k| k.as_str()),
            Some("amazon.com")
        );
        assert_eq!(
            m.match_name("amazon_fr.csv").map(|k| k.as_str()),
            Some("amazon")
        );
        assert!(
            PlatformMatcher::from_names(&["amazon.com"])
                .match_name("amazon_fr.csv")
                .is_none()
        );
    }

    #[test]
    fn duplicate_and_empty_keys_are_dropped() {
        let m = PlatformMatcher::from_names(&["ebay", "EBAY", "", "amazon-us"]);
        let keys: Vec<&str> = m.keys().iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["ebay", "amazon_us"]);
    }
}
