//! Case-insensitive header lookup shared by the poll reader and the roster.

use std::collections::HashMap;

/// Header text → column index, built once per table.
///
/// Keys are trimmed and lower-cased. When two columns carry the same header
/// the leftmost one wins.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    columns: HashMap<String, usize>,
    ordered: Vec<(String, usize)>,
}

impl HeaderIndex {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: AsRef<str>,
    {
        let mut index = HeaderIndex::default();
        for (col, text) in headers {
            let key = normalize_header(text.as_ref());
            if key.is_empty() {
                continue;
            }
            index.ordered.push((key.clone(), col));
            index.columns.entry(key).or_insert(col);
        }
        index.ordered.sort_by_key(|(_, col)| *col);
        index
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.columns.get(&normalize_header(name)).copied()
    }

    /// Columns whose header contains `needle`, in column order.
    pub fn matching(&self, needle: &str) -> Vec<usize> {
        let needle = normalize_header(needle);
        if needle.is_empty() {
            return Vec::new();
        }
        self.ordered
            .iter()
            .filter(|(key, _)| key.contains(&needle))
            .map(|(_, col)| *col)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Trim, drop a UTF-8 byte order mark and lower-case.
pub fn normalize_header(text: &str) -> String {
    text.trim_start_matches('\u{feff}').trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(headers: &[&str]) -> HeaderIndex {
        HeaderIndex::new(headers.iter().copied().enumerate())
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let idx = index(&["Full name", " EMAIL ", "Sortable Name"]);
        assert_eq!(idx.find("email"), Some(1));
        assert_eq!(idx.find("Sortable name"), Some(2));
        assert_eq!(idx.find("SIS Id"), None);
    }

    #[test]
    fn test_leftmost_duplicate_wins() {
        let idx = index(&["Email", "email"]);
        assert_eq!(idx.find("Email"), Some(0));
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn test_blank_headers_are_skipped() {
        let idx = index(&["", "  ", "Email"]);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.find(""), None);
    }

    #[test]
    fn test_matching_substring() {
        let idx = index(&[
            "Email",
            "Lecture 3 - Q1 (multiple choice)",
            "lecture 3 - Q2",
            "Lecture 4 - Q1",
        ]);
        assert_eq!(idx.matching("LECTURE 3"), vec![1, 2]);
        assert!(idx.matching("Lecture 9").is_empty());
        assert!(idx.matching("   ").is_empty());
    }

    #[test]
    fn test_bom_is_ignored() {
        let idx = index(&["\u{feff}Email"]);
        assert_eq!(idx.find("email"), Some(0));
    }
}
