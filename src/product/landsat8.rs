use super::convention::{self, Convention};
use super::metadata::MetadataLocator;
use super::{Platform, ProcessingType, ProductKind};
use crate::error::ClassificationError;
use chrono::NaiveDateTime;
use std::path::Path;

pub(super) const NATIVE: Convention = Convention {
    kind: ProductKind::Landsat8Native,
    pattern: r"^L8_\w{4}_L8C_L[12]VALD_[\d_]+\.DBL\.DIR$",
    processing_type: ProcessingType::Native,
    platform: landsat8,
    level: convention::earth_explorer_level,
    tile: native_tile,
    date: convention::earth_explorer_date,
    metadata: convention::earth_explorer_header,
    orbit: convention::no_orbit,
    production: convention::no_production,
};

pub(super) const MUSCATE: Convention = Convention {
    kind: ProductKind::Landsat8Muscate,
    pattern: r"^LANDSAT8[\w-]*_[-\d]+_L(1C|2A)_T\d{2}[a-zA-Z]{3}_\w_V[\d-]+$",
    processing_type: ProcessingType::Muscate,
    platform: landsat8,
    level: convention::muscate_level,
    tile: convention::mgrs_tile,
    date: convention::muscate_date,
    metadata: convention::muscate_metadata,
    orbit: convention::no_orbit,
    production: convention::muscate_version,
};

/// Pre-collection scene id: `LC8` + path/row + `YYYYDDD` + station + version.
pub(super) const LC1: Convention = Convention {
    kind: ProductKind::Landsat8Lc1,
    pattern: r"^LC8\d{13}[A-Z]{3}\d{2}$",
    processing_type: ProcessingType::Lc1,
    platform: landsat8,
    level: convention::always_l1c,
    tile: lc1_tile,
    date: lc1_date,
    metadata: mtl_metadata,
    orbit: convention::no_orbit,
    production: lc1_version,
};

pub(super) const LC2: Convention = Convention {
    kind: ProductKind::Landsat8Lc2,
    pattern: r"^LC08_L\w{3}_\d{6}_\d{8}_\d{8}_\d{2}_\w{2}$",
    processing_type: ProcessingType::Lc2,
    platform: landsat8,
    level: convention::always_l1c,
    tile: lc2_tile,
    date: lc2_date,
    metadata: mtl_metadata,
    orbit: convention::no_orbit,
    production: lc2_processing_date,
};

fn landsat8(_base: &str) -> Platform {
    Platform::Landsat8
}

fn native_tile(base: &str) -> Result<String, ClassificationError> {
    convention::tile_field(base, 4)
}

fn lc1_tile(base: &str) -> Result<String, ClassificationError> {
    base.get(3..9)
        .map(str::to_string)
        .ok_or_else(|| ClassificationError::MissingTile(base.to_string()))
}

fn lc1_date(base: &str) -> Result<NaiveDateTime, ClassificationError> {
    let year_doy = base
        .get(9..16)
        .ok_or_else(|| convention::invalid_date(base, "missing acquisition day"))?;
    convention::parse_noon(base, year_doy, "%Y%j")
}

// The two trailing digits are the archive version.
fn lc1_version(base: &str) -> String {
    base.get(19..).unwrap_or_default().to_string()
}

fn lc2_tile(base: &str) -> Result<String, ClassificationError> {
    convention::tile_field(base, 2)
}

fn lc2_date(base: &str) -> Result<NaiveDateTime, ClassificationError> {
    let stamp = convention::field(base, 3)
        .ok_or_else(|| convention::invalid_date(base, "missing acquisition date"))?;
    convention::parse_noon(base, stamp, "%Y%m%d")
}

fn lc2_processing_date(base: &str) -> String {
    convention::field(base, 4).unwrap_or_default().to_string()
}

fn mtl_metadata(root: &Path, _base: &str) -> MetadataLocator {
    MetadataLocator::inside(root, "*_MTL.txt")
}
