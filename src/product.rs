//! Typed records for the L1/L2 products found on disk, and the classifier that
//! derives them from directory names.
//!
//! Every supported naming convention owns one pattern and the derivations it
//! can support (platform, level, tile or site, acquisition date, relative
//! orbit, production key). Conventions are tried in
//! a fixed priority order and the first matching pattern wins; see
//! [`convention::PRIORITY`].
mod convention;
mod landsat8;
mod metadata;
mod sentinel2;
mod spot;
mod venus;

pub use metadata::MetadataLocator;

use crate::error::{ClassificationError, MetadataError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Sentinel2,
    Landsat8,
    Venus,
    Spot4,
    Spot5,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Sentinel2 => "sentinel2",
            Platform::Landsat8 => "landsat8",
            Platform::Venus => "venus",
            Platform::Spot4 => "spot4",
            Platform::Spot5 => "spot5",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    L1C,
    L2A,
    L3A,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::L1C => "l1c",
            Level::L2A => "l2a",
            Level::L3A => "l3a",
        };
        write!(f, "{name}")
    }
}

/// Family of the naming convention a product follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingType {
    /// Format delivered by the ground segment (`.SAFE`, EarthExplorer `.DBL.DIR`).
    Native,
    /// Standardized archive format (MUSCATE/THEIA).
    Muscate,
    /// Legacy Sentinel-2 EarthExplorer format.
    Ssc,
    Lc1,
    Lc2,
}

/// The closed set of naming conventions the classifier recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductKind {
    Sentinel2Native,
    Sentinel2Muscate,
    Sentinel2Ssc,
    Landsat8Native,
    Landsat8Muscate,
    Landsat8Lc1,
    Landsat8Lc2,
    VenusMuscate,
    VenusNative,
    SpotMuscate,
}

/// One satellite acquisition on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    kind: ProductKind,
    platform: Platform,
    processing_type: ProcessingType,
    level: Level,
    tile: String,
    date: NaiveDateTime,
    path: PathBuf,
    metadata: MetadataLocator,
    #[serde(default)]
    orbit: Option<u16>,
    #[serde(default)]
    production: String,
}

/// Classify a directory entry by its name.
///
/// Returns `Ok(None)` when no naming convention matches. A name that matches a
/// convention but whose level, tile or date cannot be derived is an error.
pub fn classify<P: AsRef<Path>>(path: P) -> Result<Option<Product>, ClassificationError> {
    let path = path.as_ref();
    let Some(base) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let Some(convention) = convention::matching(base) else {
        return Ok(None);
    };

    Ok(Some(Product {
        kind: convention.kind,
        platform: (convention.platform)(base),
        processing_type: convention.processing_type,
        level: (convention.level)(base)?,
        tile: (convention.tile)(base)?,
        date: (convention.date)(base)?,
        path: path.to_path_buf(),
        metadata: (convention.metadata)(path, base),
        orbit: (convention.orbit)(base),
        production: (convention.production)(base),
    }))
}

impl Product {
    pub fn kind(&self) -> ProductKind {
        self.kind
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Tile (without the leading `T` for MGRS tiles) or site name.
    pub fn tile(&self) -> &str {
        &self.tile
    }

    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Relative orbit, when the name carries one (Sentinel-2 native only).
    pub fn orbit(&self) -> Option<u16> {
        self.orbit
    }

    /// Key ordering reprocessings of the same acquisition (processing
    /// baseline, archive version, processing date). Empty when the naming
    /// convention carries none.
    pub fn production(&self) -> &str {
        &self.production
    }

    pub fn metadata(&self) -> &MetadataLocator {
        &self.metadata
    }

    /// Resolve the metadata file. Only touches the filesystem when called.
    pub fn metadata_file(&self) -> Result<PathBuf, MetadataError> {
        self.metadata.resolve()
    }

    pub fn is_valid(&self) -> bool {
        if self.processing_type == ProcessingType::Muscate && self.level == Level::L2A {
            return metadata::has_l2_validity_flag(&self.path).unwrap_or(false);
        }
        self.metadata_file().is_ok()
    }

    /// Filesystem entries the processor needs to see for this product.
    pub fn staging_entries(&self) -> Result<Vec<PathBuf>, MetadataError> {
        let mut entries = vec![self.path.clone()];
        if let MetadataLocator::Companion(_) = self.metadata {
            entries.push(self.metadata_file()?);
        }
        Ok(entries)
    }

    /// Chronological order, ties broken by path.
    pub fn chronological(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialEq for Product {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date
            && self.level == other.level
            && self.metadata == other.metadata
            && self.tile == other.tile
            && self.platform == other.platform
    }
}

impl Eq for Product {}
