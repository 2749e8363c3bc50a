use super::convention::{self, Convention};
use super::{Platform, ProcessingType, ProductKind};
use crate::error::ClassificationError;

pub(super) const MUSCATE: Convention = Convention {
    kind: ProductKind::VenusMuscate,
    pattern: r"^VENUS(-XS)?_[-\d]+_L(1C|2A|3A)_\w+_\w_V[\w-]+$",
    processing_type: ProcessingType::Muscate,
    platform: venus,
    level: convention::muscate_level,
    tile: muscate_site,
    date: convention::muscate_date,
    metadata: convention::muscate_metadata,
    orbit: convention::no_orbit,
    production: convention::muscate_version,
};

pub(super) const NATIVE: Convention = Convention {
    kind: ProductKind::VenusNative,
    pattern: r"^VE_\w{4}_VSC_L[12]VALD_\w+\.DBL\.DIR$",
    processing_type: ProcessingType::Native,
    platform: venus,
    level: convention::earth_explorer_level,
    tile: native_site,
    date: convention::earth_explorer_date,
    metadata: convention::earth_explorer_header,
    orbit: convention::no_orbit,
    production: convention::no_production,
};

fn venus(_base: &str) -> Platform {
    Platform::Venus
}

// Venus acquires over named sites rather than tiles.
fn muscate_site(base: &str) -> Result<String, ClassificationError> {
    convention::tile_field(base, 3)
}

fn native_site(base: &str) -> Result<String, ClassificationError> {
    convention::tile_field(base, 4)
}
