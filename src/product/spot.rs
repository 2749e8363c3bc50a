use super::convention::{self, Convention};
use super::{Platform, ProcessingType, ProductKind};
use crate::error::ClassificationError;

pub(super) const MUSCATE: Convention = Convention {
    kind: ProductKind::SpotMuscate,
    pattern: r"^SPOT[45][\w-]*_[-\d]+_L(1C|2A|3A)_[\w-]+_\w_V[\d-]+$",
    processing_type: ProcessingType::Muscate,
    platform: spot,
    level: convention::muscate_level,
    tile: site,
    date: convention::muscate_date,
    metadata: convention::muscate_metadata,
    orbit: convention::no_orbit,
    production: convention::muscate_version,
};

fn spot(base: &str) -> Platform {
    if base.starts_with("SPOT4") {
        Platform::Spot4
    } else {
        Platform::Spot5
    }
}

// The site sits third from the end: `..._<site>_C_V1-0`.
fn site(base: &str) -> Result<String, ClassificationError> {
    base.rsplit('_')
        .nth(2)
        .filter(|s| !s.is_empty())
        .map(convention::tile_or_site)
        .ok_or_else(|| ClassificationError::MissingTile(base.to_string()))
}
