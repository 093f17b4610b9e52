//! Multicolor detection: caption/filename heuristic plus layered-3D-archive
//! structural analysis (spec.md §4.12), grounded directly on
//! `services/multicolor.py`.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;
use std::sync::LazyLock;

use crate::domain::MulticolorSource;

static MULTICOLOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)multi[- ]?colou?r").unwrap(),
        Regex::new(r"(?i)\bMMU\b").unwrap(),
        Regex::new(r"(?i)\bAMS\b").unwrap(),
        Regex::new(r"(?i)\bIDEX\b").unwrap(),
        Regex::new(r"(?i)dual[- ]?colou?r").unwrap(),
        Regex::new(r"(?i)multi[- ]?material").unwrap(),
        Regex::new(r"(?i)\d+\s*colou?rs?").unwrap(),
    ]
});

/// Candidate model-file locations inside a 3MF zip, checked in order
/// before falling back to any `.model` entry.
const MODEL_FILE_CANDIDATES: &[&str] =
    &["3D/3dmodel.model", "3dmodel.model", "Metadata/model.model"];

pub fn detect_from_text(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    MULTICOLOR_PATTERNS.iter().any(|pattern| pattern.is_match(text))
}

pub fn detect_from_caption_and_files(caption: Option<&str>, filenames: &[String]) -> bool {
    if let Some(caption) = caption {
        if detect_from_text(caption) {
            return true;
        }
    }
    filenames.iter().any(|f| detect_from_text(f))
}

#[derive(Debug, Default, Clone)]
pub struct ThreeMfAnalysis {
    pub colors: Vec<String>,
    pub materials: Vec<String>,
    pub is_multicolor: bool,
}

fn find_model_entry(archive: &mut zip::ZipArchive<std::fs::File>) -> Option<String> {
    let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
    for candidate in MODEL_FILE_CANDIDATES {
        if names.iter().any(|n| n == candidate) {
            return Some((*candidate).to_string());
        }
    }
    names.into_iter().find(|n| n.ends_with(".model"))
}

fn local_name(tag: &[u8]) -> String {
    let tag = String::from_utf8_lossy(tag);
    match tag.rsplit_once(':') {
        Some((_, local)) => local.to_ascii_lowercase(),
        None => tag.to_ascii_lowercase(),
    }
}

fn attr_value(e: &quick_xml::events::BytesStart, key: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        let k = String::from_utf8_lossy(a.key.as_ref());
        let k = k.rsplit_once(':').map(|(_, l)| l).unwrap_or(&k).to_string();
        if k.eq_ignore_ascii_case(key) {
            a.unescape_value().ok().map(|v| v.to_string())
        } else {
            None
        }
    })
}

/// Opens the 3MF as a zip, finds the model XML, and counts distinct
/// base-material/color nodes. `is_multicolor` is true when more than one
/// distinct color or material reference is found.
pub fn detect_from_3mf(path: &Path) -> ThreeMfAnalysis {
    let mut analysis = ThreeMfAnalysis::default();

    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return analysis,
    };
    let mut archive = match zip::ZipArchive::new(file) {
        Ok(a) => a,
        Err(_) => return analysis,
    };
    let Some(model_entry) = find_model_entry(&mut archive) else {
        return analysis;
    };
    let mut xml_content = String::new();
    let mut entry = match archive.by_name(&model_entry) {
        Ok(e) => e,
        Err(_) => return analysis,
    };
    if entry.read_to_string(&mut xml_content).is_err() {
        return analysis;
    }
    drop(entry);

    let mut colors: HashSet<String> = HashSet::new();
    let mut materials: HashSet<String> = HashSet::new();

    let mut reader = Reader::from_str(&xml_content);
    reader.config_mut().trim_text(true);
    let mut pending_color_text_tag: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let tag = local_name(e.name().as_ref());
                match tag.as_str() {
                    "base" => {
                        if let Some(color) = attr_value(&e, "color") {
                            colors.insert(color);
                        }
                    }
                    "color" => {
                        if let Some(value) = attr_value(&e, "value") {
                            colors.insert(value);
                        } else {
                            pending_color_text_tag = Some(tag);
                        }
                    }
                    "object" | "component" => {
                        if let Some(material_id) = attr_value(&e, "materialid").or_else(|| attr_value(&e, "pid")) {
                            materials.insert(material_id);
                        }
                    }
                    "basematerials" => {
                        if let Some(id) = attr_value(&e, "id") {
                            materials.insert(format!("basematerials_{id}"));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if pending_color_text_tag.take().is_some() {
                    if let Ok(text) = t.unescape() {
                        let text = text.trim();
                        if !text.is_empty() {
                            colors.insert(text.to_string());
                        }
                    }
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    analysis.is_multicolor = colors.len() > 1 || materials.len() > 1;
    analysis.colors = colors.into_iter().collect();
    analysis.materials = materials.into_iter().collect();
    analysis
}

/// Resolve which `multicolor_status` write should win, per the precedence
/// decided in SPEC_FULL.md §4: USER_OVERRIDE > 3MF_ANALYSIS > HEURISTIC.
pub fn should_overwrite(current_source: MulticolorSource, incoming_source: MulticolorSource) -> bool {
    incoming_source >= current_source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mmu_keyword() {
        assert!(detect_from_text("Dragon MMU edition"));
    }

    #[test]
    fn detects_digit_colors_pattern() {
        assert!(detect_from_text("4 color test print"));
    }

    #[test]
    fn does_not_detect_plain_text() {
        assert!(!detect_from_text("Dragon v2 fantasy miniature"));
    }

    #[test]
    fn caption_checked_before_filenames() {
        assert!(detect_from_caption_and_files(
            Some("dual-color dragon"),
            &["dragon.stl".to_string()]
        ));
    }

    #[test]
    fn filenames_checked_when_caption_does_not_match() {
        assert!(detect_from_caption_and_files(
            Some("a dragon"),
            &["dragon_AMS.stl".to_string()]
        ));
    }

    #[test]
    fn precedence_user_override_wins_over_everything() {
        assert!(should_overwrite(
            MulticolorSource::ThreeMfAnalysis,
            MulticolorSource::UserOverride
        ));
        assert!(!should_overwrite(
            MulticolorSource::UserOverride,
            MulticolorSource::Heuristic
        ));
    }

    #[test]
    fn precedence_3mf_beats_heuristic() {
        assert!(should_overwrite(
            MulticolorSource::Heuristic,
            MulticolorSource::ThreeMfAnalysis
        ));
        assert!(!should_overwrite(
            MulticolorSource::ThreeMfAnalysis,
            MulticolorSource::Heuristic
        ));
    }
}
