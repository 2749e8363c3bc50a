use super::convention::{self, Convention};
use super::metadata::MetadataLocator;
use super::{Platform, ProcessingType, ProductKind};
use crate::error::ClassificationError;
use chrono::NaiveDateTime;
use std::path::Path;

pub(super) const NATIVE: Convention = Convention {
    kind: ProductKind::Sentinel2Native,
    pattern: r"^S2[AB]_MSIL1C_\d+T\d+_N\d+_R\d+_T\d{2}[a-zA-Z]{3}_\d+T\d+\.SAFE$",
    processing_type: ProcessingType::Native,
    platform: sentinel2,
    level: convention::always_l1c,
    tile: convention::mgrs_tile,
    date: native_date,
    metadata: native_metadata,
    orbit: native_orbit,
    production: native_production,
};

pub(super) const MUSCATE: Convention = Convention {
    kind: ProductKind::Sentinel2Muscate,
    pattern: r"^SENTINEL2[ABX]_[-\d]+_L(1C|2A|3A)_T\d{2}[a-zA-Z]{3}_\w_V[\d-]+$",
    processing_type: ProcessingType::Muscate,
    platform: sentinel2,
    level: convention::muscate_level,
    tile: convention::mgrs_tile,
    date: convention::muscate_date,
    metadata: convention::muscate_metadata,
    orbit: convention::no_orbit,
    production: convention::muscate_version,
};

pub(super) const SSC: Convention = Convention {
    kind: ProductKind::Sentinel2Ssc,
    pattern: r"^S2[AB]_OPER_SSC_L[12]VALD_\d{2}[a-zA-Z]{3}_\w+\.DBL\.DIR$",
    processing_type: ProcessingType::Ssc,
    platform: sentinel2,
    level: convention::earth_explorer_level,
    tile: ssc_tile,
    date: convention::earth_explorer_date,
    metadata: convention::earth_explorer_header,
    orbit: convention::no_orbit,
    production: convention::no_production,
};

fn sentinel2(_base: &str) -> Platform {
    Platform::Sentinel2
}

// S2A_MSIL1C_<sensing start>_N..._R..._T<tile>_<product discriminator>.SAFE
fn native_date(base: &str) -> Result<NaiveDateTime, ClassificationError> {
    let stamp = convention::field(base, 2)
        .ok_or_else(|| convention::invalid_date(base, "missing sensing time"))?;
    convention::parse_datetime(base, stamp, "%Y%m%dT%H%M%S")
}

// `R051`; the leading `R` is dropped.
fn native_orbit(base: &str) -> Option<u16> {
    convention::field(base, 4)?.strip_prefix('R')?.parse().ok()
}

// Processing baseline first, then the product discriminator.
fn native_production(base: &str) -> String {
    let baseline = convention::field(base, 3).unwrap_or_default();
    let discriminator = convention::field(base, 6).unwrap_or_default();
    let discriminator = discriminator.trim_end_matches(".SAFE");
    format!("{baseline}_{discriminator}")
}

fn native_metadata(root: &Path, _base: &str) -> MetadataLocator {
    MetadataLocator::inside(root, "MTD_MSIL1C.xml")
}

// SSC tiles carry no leading `T` and are padded with underscores.
fn ssc_tile(base: &str) -> Result<String, ClassificationError> {
    convention::tile_field(base, 4)
}
