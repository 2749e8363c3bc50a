use crate::error::CatalogError;
use crate::product::{classify, Level, Platform, Product};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Products of one level found directly under a root directory, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    root: PathBuf,
    products: Vec<Product>,
    rejected: usize,
}

impl Catalog {
    /// Classify every entry under `root`, keeping those of `level` and, when
    /// given, of `tile`. Unrecognized entries and classification errors are
    /// counted and skipped.
    pub fn scan<P: AsRef<Path>>(
        root: P,
        level: Level,
        tile: Option<&str>,
    ) -> Result<Self, CatalogError> {
        let read_error = |source| CatalogError::Read {
            path: root.as_ref().to_path_buf(),
            source,
        };
        let root = fs::canonicalize(root.as_ref()).map_err(read_error)?;
        let entries = fs::read_dir(&root).map_err(|source| CatalogError::Read {
            path: root.clone(),
            source,
        })?;

        let mut products = Vec::new();
        let mut unrecognized = 0usize;
        let mut rejected = 0usize;
        for entry in entries {
            let path = entry
                .map_err(|source| CatalogError::Read {
                    path: root.clone(),
                    source,
                })?
                .path();
            match classify(&path) {
                Ok(Some(product)) => products.push(product),
                Ok(None) => {
                    debug!("Not a product: {}", path.display());
                    unrecognized += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    rejected += 1;
                }
            }
        }

        let found = products.len();
        products.retain(|p| p.level() == level && tile.map_or(true, |t| same_tile(p.tile(), t)));
        products.sort_by(Product::chronological);
        info!(
            "{} {} products in {} ({} found, {} unrecognized, {} rejected)",
            products.len(),
            level,
            root.display(),
            found,
            unrecognized,
            rejected
        );
        Ok(Self {
            root,
            products,
            rejected,
        })
    }

    pub fn from_products(root: PathBuf, mut products: Vec<Product>) -> Self {
        products.sort_by(Product::chronological);
        Self {
            root,
            products,
            rejected: 0,
        }
    }

    /// Keep the products acquired on relative orbit `orbit`. Products whose
    /// name carries no orbit cannot be told apart and are kept.
    pub fn on_orbit(mut self, orbit: u16) -> Self {
        let before = self.products.len();
        self.products.retain(|p| p.orbit().map_or(true, |o| o == orbit));
        let unknown = self.products.iter().filter(|p| p.orbit().is_none()).count();
        if unknown > 0 {
            warn!("{unknown} products carry no orbit, kept regardless of orbit R{orbit:03}");
        }
        debug!("{} products off orbit R{orbit:03} dropped", before - self.products.len());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Entries matching a naming convention whose fields could not be derived.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn platforms(&self) -> BTreeSet<Platform> {
        self.products.iter().map(Product::platform).collect()
    }

    /// Drop products whose metadata is missing or which are flagged invalid.
    pub fn valid_only(self) -> Self {
        let before = self.products.len();
        let products: Vec<Product> = self.products.into_iter().filter(Product::is_valid).collect();
        if products.len() < before {
            info!("{} invalid products ignored in {}", before - products.len(), self.root.display());
        }
        Self {
            products,
            ..self
        }
    }
}

fn same_tile(product_tile: &str, wanted: &str) -> bool {
    product_tile == wanted || wanted.strip_prefix('T') == Some(product_tile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch_dir(root: &Path, name: &str) {
        fs::create_dir(root.join(name)).unwrap();
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch_dir(root, "SENTINEL2B_20171010-105012-463_L1C_T31TCH_C_V1-0");
        touch_dir(root, "SENTINEL2A_20171008-105012-463_L1C_T31TCH_C_V1-0");
        touch_dir(root, "SENTINEL2A_20171005-105012-463_L2A_T31TCH_C_V1-0");
        touch_dir(root, "SENTINEL2A_20171001-105012-463_L1C_T31TCJ_C_V1-0");
        touch_dir(root, "S2__TEST_AUX_REFDE2_T31TCH_0001");
        fs::write(root.join("notes.txt"), "").unwrap();

        let catalog = Catalog::scan(root, Level::L1C, Some("31TCH")).unwrap();
        let names: Vec<&str> = catalog.products().iter().map(Product::name).collect();
        assert_eq!(
            names,
            vec![
                "SENTINEL2A_20171008-105012-463_L1C_T31TCH_C_V1-0",
                "SENTINEL2B_20171010-105012-463_L1C_T31TCH_C_V1-0",
            ]
        );
        assert!(catalog.products()[0].path().is_absolute());

        let all_tiles = Catalog::scan(root, Level::L1C, None).unwrap();
        assert_eq!(all_tiles.len(), 3);
        assert_eq!(
            all_tiles.platforms().into_iter().collect::<Vec<_>>(),
            vec![Platform::Sentinel2]
        );
    }

    #[test]
    fn test_misdated_product_is_rejected_not_fatal() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch_dir(root, "SENTINEL2A_20161206-105012-463_L1C_T31TCH_C_V1-0");
        touch_dir(root, "SENTINEL2A_20161306-105012-463_L1C_T31TCH_C_V1-0");

        let catalog = Catalog::scan(root, Level::L1C, Some("31TCH")).unwrap();
        assert_eq!(catalog.rejected(), 1);
        let names: Vec<&str> = catalog.products().iter().map(Product::name).collect();
        assert_eq!(names, vec!["SENTINEL2A_20161206-105012-463_L1C_T31TCH_C_V1-0"]);
    }

    #[test]
    fn test_orbit_filter_keeps_matching_and_unknown_orbits() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch_dir(root, "S2A_MSIL1C_20200601T105031_N0209_R051_T31TCH_20200601T112345.SAFE");
        touch_dir(root, "S2B_MSIL1C_20200603T104619_N0209_R008_T31TCH_20200603T121254.SAFE");
        touch_dir(root, "SENTINEL2A_20200606-105012-463_L1C_T31TCH_C_V1-0");

        let catalog = Catalog::scan(root, Level::L1C, None).unwrap().on_orbit(51);
        let names: Vec<&str> = catalog.products().iter().map(Product::name).collect();
        assert_eq!(
            names,
            vec![
                "S2A_MSIL1C_20200601T105031_N0209_R051_T31TCH_20200601T112345.SAFE",
                "SENTINEL2A_20200606-105012-463_L1C_T31TCH_C_V1-0",
            ]
        );
    }

    #[test]
    fn test_tile_filter_accepts_leading_t() {
        let dir = tempdir().unwrap();
        touch_dir(dir.path(), "S2A_OPER_SSC_L2VALD_31TCH____20160914.DBL.DIR");
        let catalog = Catalog::scan(dir.path(), Level::L2A, Some("T31TCH")).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_duplicate_dates_keep_path_order() {
        let dir = tempdir().unwrap();
        touch_dir(dir.path(), "S2B_OPER_SSC_L1VALD_31TCH____20180925.DBL.DIR");
        touch_dir(dir.path(), "S2A_OPER_SSC_L1VALD_31TCH____20180925.DBL.DIR");
        let catalog = Catalog::scan(dir.path(), Level::L1C, None).unwrap();
        assert!(catalog.products()[0].name().starts_with("S2A"));
        assert!(catalog.products()[1].name().starts_with("S2B"));
    }

    #[test]
    fn test_empty_and_missing_roots() {
        let dir = tempdir().unwrap();
        assert!(Catalog::scan(dir.path(), Level::L2A, None).unwrap().is_empty());
        let err = Catalog::scan(dir.path().join("missing"), Level::L2A, None).unwrap_err();
        assert!(matches!(err, CatalogError::Read { .. }));
    }

    #[test]
    fn test_valid_only_requires_metadata() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch_dir(root, "S2A_OPER_SSC_L2VALD_31TCH____20160914.DBL.DIR");
        fs::write(root.join("S2A_OPER_SSC_L2VALD_31TCH____20160914.HDR"), "").unwrap();
        touch_dir(root, "S2A_OPER_SSC_L2VALD_31TCH____20160924.DBL.DIR");

        let catalog = Catalog::scan(root, Level::L2A, None).unwrap();
        assert_eq!(catalog.len(), 2);
        let valid = catalog.valid_only();
        assert_eq!(valid.len(), 1);
        assert_eq!(
            valid.products()[0].name(),
            "S2A_OPER_SSC_L2VALD_31TCH____20160914.DBL.DIR"
        );
    }
}
