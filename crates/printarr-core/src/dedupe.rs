//! Pre-download heuristic and post-download cryptographic duplicate
//! detection (spec.md §4.7).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::MatchType;

/// Decorative prefixes stripped before fuzzy title/designer comparison,
/// e.g. "Re:", "FREE:", "[Remix]".
static DECORATIVE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(re:|fwd:|free:?|\[[^\]]*\]\s*)+").unwrap());

/// Normalises a title or designer name for fuzzy comparison: strips
/// decorative prefixes, lowercases, and collapses whitespace.
pub fn normalize_for_match(value: &str) -> String {
    let stripped = DECORATIVE_PREFIX.replace(value, "");
    stripped.trim().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn titles_match(a_title: &str, a_designer: &str, b_title: &str, b_designer: &str) -> bool {
    normalize_for_match(a_title) == normalize_for_match(b_title)
        && normalize_for_match(a_designer) == normalize_for_match(b_designer)
}

/// A candidate pair surfaced by one of the dedupe strategies, prior to
/// being persisted as a `DuplicateCandidate` row.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub other_design_id: String,
    pub match_type: MatchType,
}

impl CandidatePair {
    pub fn confidence(&self) -> f64 {
        self.match_type.confidence()
    }
}

/// Pre-download heuristic: given this design's own title/designer, find
/// `TITLE_DESIGNER` matches among `existing` designs (each `(id, title,
/// designer)`).
pub fn find_title_designer_candidates(
    title: &str,
    designer: &str,
    existing: &[(String, String, String)],
) -> Vec<CandidatePair> {
    existing
        .iter()
        .filter(|(_, other_title, other_designer)| {
            titles_match(title, designer, other_title, other_designer)
        })
        .map(|(id, _, _)| CandidatePair {
            other_design_id: id.clone(),
            match_type: MatchType::TitleDesigner,
        })
        .collect()
}

/// Pre-download heuristic: given this item's attachments as `(filename,
/// size)`, find `FILENAME_SIZE` matches among `existing_files` (each
/// `(design_id, filename, size)`).
pub fn find_filename_size_candidates(
    incoming: &[(String, i64)],
    existing_files: &[(String, String, i64)],
) -> Vec<CandidatePair> {
    let incoming_set: HashSet<(&str, i64)> =
        incoming.iter().map(|(name, size)| (name.as_str(), *size)).collect();

    existing_files
        .iter()
        .filter(|(_, filename, size)| incoming_set.contains(&(filename.as_str(), *size)))
        .map(|(design_id, _, _)| CandidatePair {
            other_design_id: design_id.clone(),
            match_type: MatchType::FilenameSize,
        })
        .collect()
}

/// Post-download cryptographic: given this design's file hashes, find
/// `HASH` matches among `existing_hashes` (each `(design_id, sha256)`).
/// Excludes matches against itself.
pub fn find_hash_candidates(
    this_design_id: &str,
    this_hashes: &[String],
    existing_hashes: &[(String, String)],
) -> Vec<CandidatePair> {
    let this: HashSet<&str> = this_hashes.iter().map(|h| h.as_str()).collect();
    let mut seen = HashSet::new();
    existing_hashes
        .iter()
        .filter(|(design_id, hash)| design_id != this_design_id && this.contains(hash.as_str()))
        .filter(|(design_id, _)| seen.insert(design_id.clone()))
        .map(|(design_id, _)| CandidatePair {
            other_design_id: design_id.clone(),
            match_type: MatchType::Hash,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_decorative_prefix_and_case() {
        assert_eq!(normalize_for_match("FREE: Dragon V2"), "dragon v2");
        assert_eq!(normalize_for_match("Dragon V2"), "dragon v2");
    }

    #[test]
    fn scenario_2_title_designer_dedupe() {
        let existing = vec![("A".to_string(), "Dragon v2".to_string(), "Unknown".to_string())];
        let candidates = find_title_designer_candidates("Dragon v2", "Unknown", &existing);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].match_type, MatchType::TitleDesigner);
        assert_eq!(candidates[0].confidence(), 0.7);
    }

    #[test]
    fn scenario_3_hash_dedupe_exactly_one_row_for_pair() {
        let existing_hashes = vec![
            ("A".to_string(), "e3b0…b855".to_string()),
            ("A".to_string(), "deadbeef".to_string()),
        ];
        let candidates = find_hash_candidates(
            "B",
            &["e3b0…b855".to_string()],
            &existing_hashes,
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].other_design_id, "A");
        assert_eq!(candidates[0].confidence(), 1.0);
    }

    #[test]
    fn hash_candidates_exclude_self() {
        let existing_hashes = vec![("SELF".to_string(), "abc".to_string())];
        let candidates = find_hash_candidates("SELF", &["abc".to_string()], &existing_hashes);
        assert!(candidates.is_empty());
    }

    #[test]
    fn filename_size_match_requires_both_fields() {
        let existing = vec![("A".to_string(), "dragon.zip".to_string(), 1_234_567)];
        let matches = find_filename_size_candidates(&[("dragon.zip".to_string(), 1_234_567)], &existing);
        assert_eq!(matches.len(), 1);
        let no_match = find_filename_size_candidates(&[("dragon.zip".to_string(), 999)], &existing);
        assert!(no_match.is_empty());
    }
}
