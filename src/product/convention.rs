use super::metadata::MetadataLocator;
use super::{landsat8, sentinel2, spot, venus};
use super::{Level, Platform, ProcessingType, ProductKind};
use crate::error::ClassificationError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// A naming convention: one pattern plus the derivations it supports.
pub(super) struct Convention {
    pub kind: ProductKind,
    pub pattern: &'static str,
    pub processing_type: ProcessingType,
    pub platform: fn(&str) -> Platform,
    pub level: fn(&str) -> Result<Level, ClassificationError>,
    pub tile: fn(&str) -> Result<String, ClassificationError>,
    pub date: fn(&str) -> Result<NaiveDateTime, ClassificationError>,
    pub metadata: fn(&Path, &str) -> MetadataLocator,
    /// Relative orbit, for conventions that name it.
    pub orbit: fn(&str) -> Option<u16>,
    /// Orders reprocessings of one acquisition; the greatest key is the latest.
    pub production: fn(&str) -> String,
}

/// Most specific and oldest conventions first.
pub(super) const PRIORITY: [&Convention; 10] = [
    &sentinel2::NATIVE,
    &sentinel2::MUSCATE,
    &sentinel2::SSC,
    &landsat8::NATIVE,
    &landsat8::MUSCATE,
    &landsat8::LC1,
    &landsat8::LC2,
    &venus::MUSCATE,
    &venus::NATIVE,
    &spot::MUSCATE,
];

static COMPILED: Lazy<Vec<(Regex, &'static Convention)>> = Lazy::new(|| {
    PRIORITY
        .iter()
        .map(|c| {
            let re = Regex::new(c.pattern).expect("Regex pattern should always compile");
            (re, *c)
        })
        .collect()
});

static MGRS_TILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"T\d{2}[a-zA-Z]{3}").expect("Regex pattern should always compile"));

/// First convention whose pattern matches `base`.
pub(super) fn matching(base: &str) -> Option<&'static Convention> {
    COMPILED
        .iter()
        .find(|(re, _)| re.is_match(base))
        .map(|(_, c)| *c)
}

/// Products without time-of-day are placed at noon so that day-boundary
/// rounding never shifts them by a day in gap comparisons.
pub(super) fn noon(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default())
}

pub(super) fn field(base: &str, index: usize) -> Option<&str> {
    base.split('_').nth(index).filter(|f| !f.is_empty())
}

/// Tile or site held in one `_`-separated field.
pub(super) fn tile_field(base: &str, index: usize) -> Result<String, ClassificationError> {
    field(base, index)
        .map(tile_or_site)
        .ok_or_else(|| ClassificationError::MissingTile(base.to_string()))
}

pub(super) fn invalid_date(base: &str, reason: impl ToString) -> ClassificationError {
    ClassificationError::InvalidDate {
        name: base.to_string(),
        reason: reason.to_string(),
    }
}

pub(super) fn parse_datetime(
    base: &str,
    value: &str,
    format: &str,
) -> Result<NaiveDateTime, ClassificationError> {
    NaiveDateTime::parse_from_str(value, format).map_err(|e| invalid_date(base, e))
}

pub(super) fn parse_noon(
    base: &str,
    value: &str,
    format: &str,
) -> Result<NaiveDateTime, ClassificationError> {
    NaiveDate::parse_from_str(value, format)
        .map(noon)
        .map_err(|e| invalid_date(base, e))
}

/// Tile `T31TCH` anywhere in the name, returned without its leading `T`.
pub(super) fn mgrs_tile(base: &str) -> Result<String, ClassificationError> {
    MGRS_TILE
        .find(base)
        .map(|m| m.as_str()[1..].to_string())
        .ok_or_else(|| ClassificationError::MissingTile(base.to_string()))
}

/// A site token, with the leading `T` dropped when it is shaped like a tile.
pub(super) fn tile_or_site(token: &str) -> String {
    match MGRS_TILE.find(token) {
        Some(m) if m.as_str() == token => token[1..].to_string(),
        _ => token.to_string(),
    }
}

pub(super) fn always_l1c(_base: &str) -> Result<Level, ClassificationError> {
    Ok(Level::L1C)
}

pub(super) fn muscate_level(base: &str) -> Result<Level, ClassificationError> {
    if base.contains("_L1C_") {
        Ok(Level::L1C)
    } else if base.contains("_L2A_") {
        Ok(Level::L2A)
    } else if base.contains("_L3A_") {
        Ok(Level::L3A)
    } else {
        Err(ClassificationError::UnknownLevel(base.to_string()))
    }
}

pub(super) fn earth_explorer_level(base: &str) -> Result<Level, ClassificationError> {
    if base.contains("_L1VALD") {
        Ok(Level::L1C)
    } else if base.contains("_L2VALD") {
        Ok(Level::L2A)
    } else {
        Err(ClassificationError::UnknownLevel(base.to_string()))
    }
}

/// `YYYYMMDD-hhmmss-mmm` in the second field; milliseconds are dropped.
pub(super) fn muscate_date(base: &str) -> Result<NaiveDateTime, ClassificationError> {
    let stamp = field(base, 1).ok_or_else(|| invalid_date(base, "missing date field"))?;
    let (without_ms, _) = stamp
        .rsplit_once('-')
        .ok_or_else(|| invalid_date(base, "missing milliseconds"))?;
    parse_datetime(base, without_ms, "%Y%m%d-%H%M%S")
}

/// `YYYYMMDD` as the last field before the extension.
pub(super) fn earth_explorer_date(base: &str) -> Result<NaiveDateTime, ClassificationError> {
    let stem = base.split('.').next().unwrap_or(base);
    let stamp = stem.rsplit('_').next().unwrap_or(stem);
    parse_noon(base, stamp, "%Y%m%d")
}

pub(super) fn muscate_metadata(root: &Path, _base: &str) -> MetadataLocator {
    MetadataLocator::inside(root, "*MTD_ALL.xml")
}

pub(super) fn earth_explorer_header(root: &Path, base: &str) -> MetadataLocator {
    let stem = base.split('.').next().unwrap_or(base);
    MetadataLocator::Companion(root.with_file_name(format!("{stem}.HDR")))
}

pub(super) fn no_orbit(_base: &str) -> Option<u16> {
    None
}

pub(super) fn no_production(_base: &str) -> String {
    String::new()
}

/// The trailing `V1-0` version field.
pub(super) fn muscate_version(base: &str) -> String {
    base.rsplit('_').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_priority_table_has_unique_kinds() {
        let kinds: HashSet<_> = PRIORITY.iter().map(|c| c.kind).collect();
        assert_eq!(kinds.len(), PRIORITY.len());
        assert_eq!(PRIORITY[0].kind, ProductKind::Sentinel2Native);
        assert_eq!(PRIORITY[9].kind, ProductKind::SpotMuscate);
    }

    #[test]
    fn test_every_pattern_compiles() {
        assert_eq!(COMPILED.len(), PRIORITY.len());
    }

    #[test]
    fn test_tile_or_site() {
        assert_eq!(tile_or_site("T31TCH"), "31TCH");
        assert_eq!(tile_or_site("KHUMBU"), "KHUMBU");
        assert_eq!(tile_or_site("XT31TCH"), "XT31TCH");
    }

    #[test]
    fn test_muscate_version() {
        assert_eq!(
            muscate_version("SENTINEL2A_20161206-105012-463_L1C_T31TCH_C_V1-1"),
            "V1-1"
        );
    }

    #[test]
    fn test_earth_explorer_header_is_a_sibling() {
        let locator = earth_explorer_header(
            Path::new("/l2/S2A_OPER_SSC_L2VALD_36JTT____20160914.DBL.DIR"),
            "S2A_OPER_SSC_L2VALD_36JTT____20160914.DBL.DIR",
        );
        assert_eq!(
            locator,
            MetadataLocator::Companion("/l2/S2A_OPER_SSC_L2VALD_36JTT____20160914.HDR".into())
        );
    }
}
