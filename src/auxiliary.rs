use crate::error::AuxiliaryError;
use chrono::{Duration, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

static DTM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?<tag>\w+?)_AUX_REFDE2_(?<tile>\w+)_(?<version>\d{4})$")
        .expect("Regex pattern should always compile")
});

static CAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?<tag>\w{3})_(TEST|PROD)_EXO_CAMS_(?<start>\d{8}T\d{6})_(?<end>\d{8}T\d{6})$",
    )
    .expect("Regex pattern should always compile")
});

static GIPP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^\w+?_(TEST|PROD)_GIP_",
        r"(L2ALBD|L2DIFT|L2DIRT|L2TOCR|L2WATV|L2COMM|L2SITE|L2SMAC|CKEXTL|CKQLTL)_",
        r"\w_\w+_\d{5}_\d{8}_\d{8}\.[\w.]+$"
    ))
    .expect("Regex pattern should always compile")
});

/// An EarthExplorer pair: a `.HDR` header and its `.DBL`/`.DBL.DIR` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxRecord {
    name: String,
    header: PathBuf,
    payload: PathBuf,
}

impl AuxRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &Path {
        &self.header
    }

    pub fn payload(&self) -> &Path {
        &self.payload
    }

    /// Both files of the pair, header first.
    pub fn entries(&self) -> Vec<PathBuf> {
        vec![self.header.clone(), self.payload.clone()]
    }
}

#[derive(Debug, Clone)]
struct Dtm {
    tile: String,
    record: AuxRecord,
}

/// CAMS files are valid over `[start, end]`.
#[derive(Debug, Clone)]
struct Cams {
    start: NaiveDateTime,
    end: NaiveDateTime,
    record: AuxRecord,
}

/// Terrain, aerosol and parameter files available to the processor.
#[derive(Debug, Default)]
pub struct AuxiliaryLocator {
    dtms: Vec<Dtm>,
    cams: Vec<Cams>,
    gipp: Vec<PathBuf>,
}

impl AuxiliaryLocator {
    pub fn scan(
        dtm_root: &Path,
        cams_root: Option<&Path>,
        gipp_root: Option<&Path>,
    ) -> Result<Self, AuxiliaryError> {
        let mut dtms = Vec::new();
        for dir in list_dir(dtm_root)? {
            let Some(tile) = file_name(&dir).and_then(|n| {
                DTM.captures(n).map(|c| c["tile"].to_string())
            }) else {
                continue;
            };
            if !dir.is_dir() {
                continue;
            }
            for record in earth_explorer_pairs(&dir)? {
                debug!("DTM {} for tile {}", record.name, tile);
                dtms.push(Dtm {
                    tile: tile.clone(),
                    record,
                });
            }
        }

        let mut cams = Vec::new();
        match cams_root {
            Some(root) => {
                for record in earth_explorer_pairs(root)? {
                    let Some(caps) = CAMS.captures(&record.name) else {
                        continue;
                    };
                    let start = NaiveDateTime::parse_from_str(&caps["start"], "%Y%m%dT%H%M%S");
                    let end = NaiveDateTime::parse_from_str(&caps["end"], "%Y%m%dT%H%M%S");
                    match (start, end) {
                        (Ok(start), Ok(end)) => cams.push(Cams { start, end, record }),
                        _ => warn!("Skipping CAMS file with invalid validity: {}", record.name),
                    }
                }
            }
            None => warn!("No CAMS directory configured, processing without aerosol data"),
        }
        cams.sort_by_key(|c| c.start);

        let mut gipp = Vec::new();
        if let Some(root) = gipp_root {
            gipp = list_dir(root)?
                .into_iter()
                .filter(|p| file_name(p).map_or(false, |n| GIPP.is_match(n)))
                .collect();
        }

        info!(
            "{} DTM, {} CAMS and {} GIPP files available",
            dtms.len(),
            cams.len(),
            gipp.len()
        );
        Ok(Self { dtms, cams, gipp })
    }

    /// The single DTM covering `tile`. A leading `T` on either side is ignored.
    pub fn dtm_for(&self, tile: &str) -> Result<&AuxRecord, AuxiliaryError> {
        let matches: Vec<&AuxRecord> = self
            .dtms
            .iter()
            .filter(|d| strip_t(&d.tile) == strip_t(tile))
            .map(|d| &d.record)
            .collect();
        match matches.as_slice() {
            [] => Err(AuxiliaryError::DtmNotFound(tile.to_string())),
            [record] => Ok(*record),
            _ => Err(AuxiliaryError::DuplicateDtm {
                tile: tile.to_string(),
                count: matches.len(),
            }),
        }
    }

    /// CAMS records whose validity intersects `[date - window, date + window]`.
    /// The interval saturates at the representable date range.
    pub fn cams_for(&self, date: NaiveDateTime, window: Duration) -> Vec<&AuxRecord> {
        let from = date
            .checked_sub_signed(window)
            .unwrap_or(NaiveDateTime::MIN);
        let to = date
            .checked_add_signed(window)
            .unwrap_or(NaiveDateTime::MAX);
        self.cams
            .iter()
            .filter(|c| c.start <= to && c.end >= from)
            .map(|c| &c.record)
            .collect()
    }

    pub fn gipp(&self) -> &[PathBuf] {
        &self.gipp
    }
}

fn strip_t(tile: &str) -> &str {
    tile.strip_prefix('T').unwrap_or(tile)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, AuxiliaryError> {
    let read_error = |source| AuxiliaryError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(read_error)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)?;
    paths.sort();
    Ok(paths)
}

/// Pair every `.DBL.DIR` (preferred) or `.DBL` payload in `dir` with its header.
fn earth_explorer_pairs(dir: &Path) -> Result<Vec<AuxRecord>, AuxiliaryError> {
    let mut payloads: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in list_dir(dir)? {
        let Some(name) = file_name(&path) else {
            continue;
        };
        if let Some(stem) = name.strip_suffix(".DBL.DIR") {
            payloads.insert(stem.to_string(), path.clone());
        } else if let Some(stem) = name.strip_suffix(".DBL") {
            payloads.entry(stem.to_string()).or_insert_with(|| path.clone());
        }
    }

    let mut records = Vec::new();
    for (stem, payload) in payloads {
        let header = dir.join(format!("{stem}.HDR"));
        if !header.is_file() {
            warn!("Skipping {}: no header {}", payload.display(), header.display());
            continue;
        }
        records.push(AuxRecord {
            name: stem,
            header,
            payload,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn pair(dir: &Path, stem: &str) {
        fs::create_dir_all(dir.join(format!("{stem}.DBL.DIR"))).unwrap();
        fs::write(dir.join(format!("{stem}.HDR")), "").unwrap();
    }

    fn dtm(root: &Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        pair(&dir, name);
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_dtm_lookup() {
        let root = tempdir().unwrap();
        dtm(root.path(), "S2__TEST_AUX_REFDE2_T31TCH_0001");
        dtm(root.path(), "S2__TEST_AUX_REFDE2_36JTT_0001");
        dtm(root.path(), "S2__TEST_AUX_REFDE2_T29RPQ_0001");
        dtm(root.path(), "S2__TEST_AUX_REFDE2_T29RPQ_0002");
        fs::create_dir(root.path().join("unrelated")).unwrap();

        let locator = AuxiliaryLocator::scan(root.path(), None, None).unwrap();
        let record = locator.dtm_for("31TCH").unwrap();
        assert_eq!(record.name(), "S2__TEST_AUX_REFDE2_T31TCH_0001");
        assert!(record.header().is_file());
        assert!(locator.dtm_for("T36JTT").is_ok());
        assert!(matches!(
            locator.dtm_for("33UVP"),
            Err(AuxiliaryError::DtmNotFound(_))
        ));
        assert!(matches!(
            locator.dtm_for("29RPQ"),
            Err(AuxiliaryError::DuplicateDtm { count: 2, .. })
        ));
    }

    #[test]
    fn test_cams_window() {
        let dtm_root = tempdir().unwrap();
        let cams_root = tempdir().unwrap();
        pair(cams_root.path(), "CAM_TEST_EXO_CAMS_20180101T000000_20180101T060000");
        pair(cams_root.path(), "CAM_TEST_EXO_CAMS_20180101T120000_20180101T180000");
        pair(cams_root.path(), "CAM_TEST_EXO_CAMS_20180103T000000_20180103T060000");
        // Payload without header.
        fs::create_dir(
            cams_root
                .path()
                .join("CAM_TEST_EXO_CAMS_20180101T060000_20180101T120000.DBL.DIR"),
        )
        .unwrap();

        let locator =
            AuxiliaryLocator::scan(dtm_root.path(), Some(cams_root.path()), None).unwrap();
        let names: Vec<&str> = locator
            .cams_for(at(2018, 1, 1, 10), Duration::hours(3))
            .into_iter()
            .map(AuxRecord::name)
            .collect();
        assert_eq!(
            names,
            vec!["CAM_TEST_EXO_CAMS_20180101T120000_20180101T180000"]
        );
        assert_eq!(
            locator.cams_for(at(2018, 1, 1, 10), Duration::hours(12)).len(),
            2
        );
        assert!(locator
            .cams_for(at(2018, 1, 5, 12), Duration::hours(12))
            .is_empty());
        assert_eq!(locator.cams_for(at(2018, 1, 5, 12), Duration::MAX).len(), 3);
        assert_eq!(locator.cams_for(NaiveDateTime::MAX, Duration::days(1)).len(), 0);
    }

    #[test]
    fn test_gipp_selection() {
        let dtm_root = tempdir().unwrap();
        let gipp_root = tempdir().unwrap();
        for name in [
            "S2A_TEST_GIP_L2COMM_L_ALLSITES_00001_20190626_21000101.HDR",
            "S2A_TEST_GIP_L2COMM_L_ALLSITES_00001_20190626_21000101.EEF",
            "S2B_TEST_GIP_CKQLTL_S_31TJF____10005_20150703_21000101.EEF",
            "README.md",
        ] {
            fs::write(gipp_root.path().join(name), "").unwrap();
        }
        let locator =
            AuxiliaryLocator::scan(dtm_root.path(), None, Some(gipp_root.path())).unwrap();
        assert_eq!(locator.gipp().len(), 3);
    }

    #[test]
    fn test_missing_dtm_root_is_an_error() {
        let root = tempdir().unwrap();
        let err = AuxiliaryLocator::scan(&root.path().join("DTM"), None, None).unwrap_err();
        assert!(matches!(err, AuxiliaryError::Read { .. }));
    }
}
