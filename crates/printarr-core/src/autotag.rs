//! Hashtag and filename-token tag extraction (spec.md §4.12), grounded
//! directly on `services/autotag.py`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::TagSource;

pub const MIN_TAG_LENGTH: usize = 3;
pub const MAX_TAGS_PER_SOURCE: usize = 10;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "and", "for", "with", "from", "into", "this", "that", "all", "any", "are", "was",
        "were", "been", "being", "have", "has", "had", "having", "does", "did", "doing", "will",
        "would", "should", "could", "can", "may", "might", "must", "shall", "not", "but", "what",
        "which", "who", "whom", "how", "when", "where", "why", "only", "just", "also", "very",
        "too", "stl", "3mf", "obj", "step", "stp", "zip", "rar", "7z", "tar", "file", "files",
        "part", "parts", "model", "models", "print", "printer", "printed", "printing",
        "printable", "download", "free", "new", "version", "update", "updated", "one", "two",
        "three", "four", "five", "six", "seven", "eight", "size", "small", "medium", "large",
        "big", "layer", "layers", "infill", "support", "supports", "base", "preview",
        "thumbnail", "image", "images", "photo", "photos",
    ]
    .into_iter()
    .collect()
});

static HASHTAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\w+)").unwrap());
static FILENAME_SPLIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_\-\s\.]+").unwrap());
static NON_ALNUM_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\-]").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTag {
    pub name: String,
    pub source: TagSource,
}

fn normalize_tag(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    let normalized = NON_ALNUM_DASH.replace_all(&lower, "").to_string();
    if normalized.len() >= MIN_TAG_LENGTH && !STOP_WORDS.contains(normalized.as_str()) {
        Some(normalized)
    } else {
        None
    }
}

pub fn extract_from_caption(caption: &str) -> Vec<ExtractedTag> {
    HASHTAG_PATTERN
        .captures_iter(caption)
        .filter_map(|c| normalize_tag(&c[1]))
        .take(MAX_TAGS_PER_SOURCE)
        .map(|name| ExtractedTag {
            name,
            source: TagSource::AutomaticCaption,
        })
        .collect()
}

pub fn extract_from_filename(filename: &str) -> Vec<ExtractedTag> {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => filename,
    };
    FILENAME_SPLIT_PATTERN
        .split(stem)
        .filter_map(normalize_tag)
        .take(MAX_TAGS_PER_SOURCE)
        .map(|name| ExtractedTag {
            name,
            source: TagSource::AutomaticFilename,
        })
        .collect()
}

/// Candidate design-file extensions (spec.md §4.4), reused here to decide
/// whether a caption names a model even when no attachment was classified
/// as a candidate file (e.g. a caption that only links out to one).
const DESIGN_CAPTION_EXTENSIONS: &[&str] = &["stl", "3mf", "obj", "step", "stp", "zip", "rar", "7z"];

/// True if the caption text itself signals a 3D-printable design.
pub fn caption_indicates_design(caption: &str) -> bool {
    let lower = caption.to_lowercase();
    DESIGN_CAPTION_EXTENSIONS.iter().any(|ext| lower.contains(&format!(".{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hashtags_from_caption() {
        let tags = extract_from_caption("Dragon v2 #fantasy #multicolor");
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["fantasy", "multicolor"]);
        assert!(tags.iter().all(|t| t.source == TagSource::AutomaticCaption));
    }

    #[test]
    fn filters_stop_words_and_short_tokens() {
        let tags = extract_from_filename("the_big_stl_model_v2.stl");
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["v2"]);
    }

    #[test]
    fn splits_on_separators() {
        let tags = extract_from_filename("dragon-red.fantasy_edition.3mf");
        let names: HashSet<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains("dragon"));
        assert!(names.contains("red"));
        assert!(names.contains("fantasy"));
        assert!(names.contains("edition"));
    }

    #[test]
    fn caps_at_max_tags_per_source() {
        let caption = (0..20).map(|i| format!("#tag{i}")).collect::<Vec<_>>().join(" ");
        let tags = extract_from_caption(&caption);
        assert_eq!(tags.len(), MAX_TAGS_PER_SOURCE);
    }

    #[test]
    fn caption_indicates_design_matches_known_extensions() {
        assert!(caption_indicates_design("grab the dragon.stl here"));
        assert!(caption_indicates_design("new release: Dragon.3MF"));
        assert!(!caption_indicates_design("just a status update, no files"));
    }
}
