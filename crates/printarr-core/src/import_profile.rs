//! Import-profile JSON schema (spec.md §6): structured rules an adapter
//! uses to decide which folders represent designs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStructure {
    Nested,
    Flat,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRules {
    pub model_extensions: Vec<String>,
    pub archive_extensions: Vec<String>,
    pub min_model_file_count: u32,
    pub structure: FolderStructure,
    pub model_subfolder_names: Vec<String>,
    pub require_preview_folder: bool,
    /// Short-circuits detection to every folder at this depth when set.
    pub design_depth: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleSourceKind {
    FolderName,
    ParentFolder,
    Filename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseTransform {
    None,
    Title,
    Lower,
    Upper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleRules {
    pub source: TitleSourceKind,
    pub strip_patterns: Vec<String>,
    pub case_transform: CaseTransform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRules {
    pub folder_names: Vec<String>,
    pub wildcard_folder_patterns: Vec<String>,
    pub image_extensions: Vec<String>,
    pub include_root: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreRules {
    pub folders: Vec<String>,
    pub extensions: Vec<String>,
    pub filename_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTagRules {
    pub from_subfolders: bool,
    pub from_filename: bool,
    /// 1–5.
    pub subfolder_levels: u32,
    pub strip_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportProfile {
    pub id: String,
    pub name: String,
    pub is_builtin: bool,
    pub detection: DetectionRules,
    pub title: TitleRules,
    pub preview: PreviewRules,
    pub ignore: IgnoreRules,
    pub auto_tags: AutoTagRules,
}

impl ImportProfile {
    /// A permissive baseline profile matching spec.md §6's defaults,
    /// used when an import source does not specify its own.
    pub fn default_builtin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Default".to_string(),
            is_builtin: true,
            detection: DetectionRules {
                model_extensions: vec!["stl".into(), "3mf".into(), "obj".into(), "step".into(), "stp".into()],
                archive_extensions: vec!["zip".into(), "rar".into(), "7z".into()],
                min_model_file_count: 1,
                structure: FolderStructure::Auto,
                model_subfolder_names: vec!["files".into(), "models".into()],
                require_preview_folder: false,
                design_depth: None,
            },
            title: TitleRules {
                source: TitleSourceKind::FolderName,
                strip_patterns: vec![],
                case_transform: CaseTransform::None,
            },
            preview: PreviewRules {
                folder_names: vec!["images".into(), "previews".into()],
                wildcard_folder_patterns: vec![],
                image_extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
                include_root: true,
            },
            ignore: IgnoreRules {
                folders: vec![".git".into(), "__MACOSX".into()],
                extensions: vec!["ds_store".into()],
                filename_patterns: vec![],
            },
            auto_tags: AutoTagRules {
                from_subfolders: false,
                from_filename: true,
                subfolder_levels: 1,
                strip_patterns: vec![],
            },
        }
    }

    /// Validates field ranges this schema documents (`subfolder_levels`
    /// 1–5); structural correctness of the rest is enforced by
    /// deserialization itself.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(1..=5).contains(&self.auto_tags.subfolder_levels) {
            return Err(crate::error::PrintarrError::Validation {
                field: "auto_tags.subfolder_levels".to_string(),
                message: "must be between 1 and 5".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builtin_profile_is_valid() {
        let profile = ImportProfile::default_builtin("builtin-default");
        assert!(profile.validate().is_ok());
        assert!(profile.is_builtin);
    }

    #[test]
    fn subfolder_levels_out_of_range_is_rejected() {
        let mut profile = ImportProfile::default_builtin("x");
        profile.auto_tags.subfolder_levels = 6;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let profile = ImportProfile::default_builtin("x");
        let json = serde_json::to_string(&profile).unwrap();
        let back: ImportProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.detection.min_model_file_count, profile.detection.min_model_file_count);
    }
}
