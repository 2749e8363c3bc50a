use crate::error::MetadataError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where the metadata file of a product lives.
///
/// Resolution is deferred so that classification and equality never touch
/// the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataLocator {
    /// First file matching `pattern` directly inside `dir`.
    Inside { dir: PathBuf, pattern: String },
    /// A header file stored next to the product.
    Companion(PathBuf),
}

impl MetadataLocator {
    pub fn inside(dir: &Path, pattern: &str) -> Self {
        MetadataLocator::Inside {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        }
    }

    pub fn resolve(&self) -> Result<PathBuf, MetadataError> {
        match self {
            MetadataLocator::Inside { dir, pattern } => {
                let full = format!(
                    "{}/{}",
                    glob::Pattern::escape(&dir.to_string_lossy()),
                    pattern
                );
                let mut matches: Vec<PathBuf> =
                    glob::glob(&full)?.filter_map(Result::ok).collect();
                matches.sort();
                matches.into_iter().next().ok_or_else(|| MetadataError::NotFound {
                    pattern: pattern.clone(),
                    dir: dir.clone(),
                })
            }
            MetadataLocator::Companion(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(MetadataError::NotFound {
                        pattern: path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                    })
                }
            }
        }
    }
}

/// Whether the product's `JPI_ALL.xml` lists `L2VALD` among its processing flags.
pub(super) fn has_l2_validity_flag(root: &Path) -> Result<bool, MetadataError> {
    let pattern = glob::Pattern::new("*JPI_ALL.xml")?;
    let jpi = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .find(|e| pattern.matches(&e.file_name().to_string_lossy()))
        .ok_or_else(|| MetadataError::NotFound {
            pattern: pattern.as_str().to_string(),
            dir: root.to_path_buf(),
        })?;

    let content = std::fs::read_to_string(jpi.path())?;
    let doc = roxmltree::Document::parse(&content)?;
    let valid = doc
        .descendants()
        .filter(|n| n.has_tag_name("Processing_Flags_And_Modes_List"))
        .flat_map(|list| list.children().filter(|n| n.has_tag_name("Processing_Flags_And_Modes")))
        .flat_map(|mode| mode.children().filter(|n| n.has_tag_name("Value")))
        .any(|value| value.text().map(str::trim) == Some("L2VALD"));
    Ok(valid)
}
