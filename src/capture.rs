//! Bounds-checked access to regular expression capture groups.
//!
//! Out-of-range lookups yield an empty string instead of panicking, which
//! keeps extraction code on log lines free of index bookkeeping.

use regex::{Captures, Regex};

/// The groups of one match; index 0 is the whole match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group(pub Vec<String>);

impl Group {
    /// Build from a regex match. Groups that did not participate are "".
    pub fn from_captures(caps: &Captures<'_>) -> Self {
        Self(
            caps.iter()
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }

    /// Capture the first match of `re` in `haystack`.
    pub fn capture(re: &Regex, haystack: &str) -> Option<Self> {
        re.captures(haystack).map(|caps| Self::from_captures(&caps))
    }

    /// Get group `n`, or "" if there is no such group.
    pub fn get(&self, n: usize) -> &str {
        self.0.get(n).map_or("", String::as_str)
    }

    /// Number of groups, counting the whole match.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no groups at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The groups of every match in a haystack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Groups(pub Vec<Group>);

impl Groups {
    /// Capture every non-overlapping match of `re` in `haystack`.
    pub fn capture_all(re: &Regex, haystack: &str) -> Self {
        Self(re.captures_iter(haystack).map(|caps| Group::from_captures(&caps)).collect())
    }

    /// Get group `n` of match `m`, or "" if either is out of range.
    pub fn get(&self, m: usize, n: usize) -> &str {
        self.0.get(m).map_or("", |group| group.get(n))
    }

    /// Number of matches.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pulls a rate limit key out of an input line.
///
/// Without a pattern the trimmed line is the key. With one, the key is
/// capture group `group` of the first match.
#[derive(Debug, Clone)]
pub struct KeyExtractor {
    pattern: Option<Regex>,
    group: usize,
}

impl KeyExtractor {
    /// Compile `pattern`, if any. Fails on an invalid regex.
    pub fn new(pattern: Option<&str>, group: usize) -> Result<Self, regex::Error> {
        let pattern = pattern.map(Regex::new).transpose()?;
        Ok(Self { pattern, group })
    }

    /// Returns `None` when the line yields an empty key.
    pub fn extract(&self, line: &str) -> Option<String> {
        let key = match &self.pattern {
            None => line.trim().to_string(),
            Some(re) => Group::capture(re, line)?.get(self.group).to_string(),
        };
        (!key.is_empty()).then_some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_get_in_and_out_of_range() {
        let group = Group(vec!["10.0.0.1 GET".to_string(), "10.0.0.1".to_string()]);
        assert_eq!(group.get(0), "10.0.0.1 GET");
        assert_eq!(group.get(1), "10.0.0.1");
        assert_eq!(group.get(2), "");
        assert_eq!(Group::default().get(0), "");
    }

    #[test]
    fn test_group_from_regex_with_optional_group() {
        let re = Regex::new(r"^(\d+\.\d+\.\d+\.\d+)(?: user=(\w+))?").unwrap();

        let group = Group::capture(&re, "192.168.1.7 GET /").unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(group.get(1), "192.168.1.7");
        assert_eq!(group.get(2), "");

        let group = Group::capture(&re, "192.168.1.7 user=alice").unwrap();
        assert_eq!(group.get(2), "alice");

        assert!(Group::capture(&re, "no address here").is_none());
    }

    #[test]
    fn test_groups_get() {
        let re = Regex::new(r"(\w+)=(\d+)").unwrap();
        let groups = Groups::capture_all(&re, "a=1 b=22 c=333");

        assert_eq!(groups.len(), 3);
        assert_eq!(groups.get(1, 1), "b");
        assert_eq!(groups.get(2, 2), "333");
        assert_eq!(groups.get(2, 3), "");
        assert_eq!(groups.get(3, 0), "");
        assert!(Groups::capture_all(&re, "nothing").is_empty());
    }

    #[test]
    fn test_key_extractor_whole_line() {
        let extractor = KeyExtractor::new(None, 1).unwrap();
        assert_eq!(extractor.extract("  10.1.2.3 \n"), Some("10.1.2.3".to_string()));
        assert_eq!(extractor.extract("   "), None);
    }

    #[test]
    fn test_key_extractor_with_group() {
        let extractor = KeyExtractor::new(Some(r"client=(\S+)"), 1).unwrap();
        assert_eq!(
            extractor.extract("GET /index client=172.16.0.9 200"),
            Some("172.16.0.9".to_string())
        );
        assert_eq!(extractor.extract("GET /index 200"), None);

        // A group past the end of the pattern never yields a key
        let extractor = KeyExtractor::new(Some(r"client=(\S+)"), 4).unwrap();
        assert_eq!(extractor.extract("client=172.16.0.9"), None);
    }

    #[test]
    fn test_key_extractor_rejects_bad_pattern() {
        assert!(KeyExtractor::new(Some("(unclosed"), 1).is_err());
    }
}
