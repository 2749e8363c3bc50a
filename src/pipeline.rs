use crate::auxiliary::AuxiliaryLocator;
use crate::catalog::Catalog;
use crate::config::{Config, Paths};
use crate::error::{CatalogError, ScheduleError};
use crate::processor::{Invocation, Processor};
use crate::product::Level;
use crate::staging::ContextBuilder;
use crate::workplan::{schedule, Mode, ScheduleSettings};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What to process.
#[derive(Debug, Clone)]
pub struct Request {
    pub tile: String,
    pub site: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Overrides the configured `max_backward_count`.
    pub nbackward: Option<usize>,
    /// Relative orbit to restrict Sentinel-2 native products to.
    pub orbit: Option<u16>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Keep staging directories after successful runs.
    pub keep_staging: bool,
    /// Plan only.
    pub dry_run: bool,
    pub plan_out: Option<PathBuf>,
}

/// Directories of one tile, with the optional site level applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub l1: PathBuf,
    pub l2: PathBuf,
    pub work: PathBuf,
}

impl Layout {
    pub fn new(paths: &Paths, tile: &str, site: Option<&str>) -> Self {
        let nested = |root: &Path| match site {
            Some(site) => root.join(site).join(tile),
            None => root.join(tile),
        };
        Self {
            l1: site.map_or_else(|| paths.l1.clone(), |s| paths.l1.join(s)),
            l2: nested(&paths.l2),
            work: nested(&paths.work),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub planned: usize,
    pub processed: Vec<(String, Mode)>,
    /// Workplans that could not be staged, with the reason.
    pub skipped: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

pub struct Pipeline<P: Processor> {
    config: Config,
    processor: P,
}

impl<P: Processor> Pipeline<P> {
    pub fn new(config: Config, processor: P) -> Self {
        Self { config, processor }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    fn settings(&self, request: &Request) -> ScheduleSettings {
        let scheduling = &self.config.scheduling;
        ScheduleSettings {
            start: request.start,
            end: request.end,
            max_backward_count: request.nbackward.unwrap_or(scheduling.max_backward_count),
            overwrite: request.overwrite,
            product_date_tolerance: scheduling.product_date_tolerance(),
            max_reference_age: scheduling.max_reference_age(),
        }
    }

    fn l2_catalog(&self, layout: &Layout, tile: &str) -> Result<Catalog> {
        if !layout.l2.is_dir() {
            return Ok(Catalog::default());
        }
        let catalog = Catalog::scan(&layout.l2, Level::L2A, Some(tile))
            .context("Failed to scan L2 products")?;
        Ok(catalog.valid_only())
    }

    pub fn run(&self, request: &Request, options: &RunOptions) -> Result<RunReport> {
        let paths = &self.config.paths;
        let layout = Layout::new(paths, &request.tile, request.site.as_deref());
        info!("L1 {}, L2 {}, work {}", layout.l1.display(), layout.l2.display(), layout.work.display());

        let mut l1 = Catalog::scan(&layout.l1, Level::L1C, Some(request.tile.as_str()))
            .context("Failed to scan L1 products")?;
        if let Some(orbit) = request.orbit {
            l1 = l1.on_orbit(orbit);
        }
        if l1.is_empty() {
            return Err(CatalogError::Empty(layout.l1.clone()).into());
        }
        let l2 = self.l2_catalog(&layout, &request.tile)?;

        let settings = self.settings(request);
        let mut plan = match schedule(l1.products(), l2.products(), &settings) {
            Ok(plan) => plan,
            Err(e @ ScheduleError::NothingToProcess { .. }) => {
                info!("{}", e);
                return Ok(RunReport::default());
            }
            Err(e) => return Err(e).context("Failed to schedule workplans"),
        };

        let locator = AuxiliaryLocator::scan(&paths.dtm, paths.cams.as_deref(), paths.gipp.as_deref())
            .context("Failed to locate auxiliary files")?;
        plan.attach_auxiliary(&locator, self.config.scheduling.cams_window())
            .context("Failed to resolve auxiliary files")?;

        for line in plan.to_string().lines() {
            info!("{}", line);
        }
        if let Some(path) = &options.plan_out {
            plan.write(path)
                .with_context(|| format!("Failed to write plan to {}", path.display()))?;
        }

        let mut report = RunReport {
            planned: plan.len(),
            warnings: plan.warnings().to_vec(),
            ..Default::default()
        };
        if options.dry_run {
            return Ok(report);
        }

        fs::create_dir_all(&layout.l2)
            .with_context(|| format!("Failed to create {}", layout.l2.display()))?;
        let builder = ContextBuilder::new(
            layout.work.clone(),
            locator.gipp().to_vec(),
            settings.reference_policy(),
        );

        for workplan in plan.workplans() {
            let name = workplan.primary().name().to_string();
            let l2 = self.l2_catalog(&layout, &request.tile)?;
            let context = match builder.stage(workplan, &l2) {
                Ok(context) => context,
                Err(e) if self.config.scheduling.abort_on_staging_error => {
                    return Err(e).with_context(|| format!("Failed to stage {name}"));
                }
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    report.skipped.push((name, e.to_string()));
                    continue;
                }
            };

            let invocation = Invocation {
                input_dir: context.dir().to_path_buf(),
                output_dir: layout.l2.clone(),
                mode: workplan.mode(),
                tile: workplan.tile().to_string(),
            };
            if let Err(e) = self.processor.invoke(&invocation) {
                let kept = context.keep();
                error!("{} failed on {}: {}", self.processor.name(), name, e);
                return Err(e).with_context(|| {
                    format!("Processing of {name} failed, inputs kept in {}", kept.display())
                });
            }

            if options.keep_staging {
                info!("Keeping {}", context.keep().display());
            } else {
                context
                    .teardown()
                    .with_context(|| format!("Failed to clean up staging of {name}"))?;
            }
            report.processed.push((name, workplan.mode()));
        }

        info!(
            "{} of {} workplans processed, {} skipped",
            report.processed.len(),
            report.planned,
            report.skipped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheduling;
    use crate::error::ProcessorError;
    use std::cell::RefCell;
    use tempfile::{tempdir, TempDir};

    const JPI: &str = "<JPI><Processing_Flags_And_Modes_List><Processing_Flags_And_Modes>\
<Key>Validity_Flag</Key><Value>L2VALD</Value>\
</Processing_Flags_And_Modes></Processing_Flags_And_Modes_List></JPI>";

    /// Writes a valid L2 product for the oldest L1 product it is given.
    struct FakeMaja {
        calls: RefCell<Vec<Invocation>>,
        produce: bool,
        code: i32,
        /// Deletes its input directory, as a processor cleaning up after itself would.
        consume_inputs: bool,
    }

    impl FakeMaja {
        fn new(produce: bool, code: i32) -> Self {
            Self {
                calls: RefCell::new(vec![]),
                produce,
                code,
                consume_inputs: false,
            }
        }
    }

    impl Processor for FakeMaja {
        fn name(&self) -> String {
            "fake-maja".to_string()
        }

        fn run(&self, invocation: &Invocation) -> Result<i32, ProcessorError> {
            self.calls.borrow_mut().push(invocation.clone());
            if self.produce {
                let mut l1: Vec<String> = fs::read_dir(&invocation.input_dir)
                    .unwrap()
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .filter(|n| n.contains("_L1C_"))
                    .collect();
                l1.sort();
                let name = l1[0].replace("_L1C_", "_L2A_");
                let product = invocation.output_dir.join(&name);
                fs::create_dir_all(product.join("DATA")).unwrap();
                fs::write(product.join(format!("{name}_MTD_ALL.xml")), "").unwrap();
                fs::write(product.join("DATA").join(format!("{name}_JPI_ALL.xml")), JPI).unwrap();
            }
            if self.consume_inputs {
                fs::remove_dir_all(&invocation.input_dir).unwrap();
            }
            Ok(self.code)
        }
    }

    fn setup(days: &[&str]) -> (TempDir, Config) {
        let root = tempdir().unwrap();
        let r = root.path();
        for dir in ["L1", "L2", "work", "CAMS"] {
            fs::create_dir(r.join(dir)).unwrap();
        }
        for day in days {
            let name = format!("SENTINEL2A_{day}-105012-463_L1C_T31TCH_C_V1-0");
            fs::create_dir(r.join("L1").join(name)).unwrap();
        }
        let dtm = r.join("DTM").join("S2__TEST_AUX_REFDE2_T31TCH_0001");
        fs::create_dir_all(dtm.join("S2__TEST_AUX_REFDE2_T31TCH_0001.DBL.DIR")).unwrap();
        fs::write(dtm.join("S2__TEST_AUX_REFDE2_T31TCH_0001.HDR"), "").unwrap();
        fs::write(r.join("maja"), "").unwrap();

        let config = Config {
            paths: Paths {
                work: r.join("work"),
                l1: r.join("L1"),
                l2: r.join("L2"),
                dtm: r.join("DTM"),
                processor: r.join("maja"),
                cams: Some(r.join("CAMS")),
                gipp: None,
                userconf: None,
            },
            scheduling: Scheduling {
                max_backward_count: 2,
                ..Default::default()
            },
        };
        (root, config)
    }

    fn request() -> Request {
        Request {
            tile: "31TCH".to_string(),
            site: None,
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
            nbackward: None,
            orbit: None,
            overwrite: false,
        }
    }

    fn count_entries(dir: &Path) -> usize {
        fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_layout() {
        let (_root, config) = setup(&[]);
        let plain = Layout::new(&config.paths, "31TCH", None);
        assert_eq!(plain.l1, config.paths.l1);
        assert_eq!(plain.l2, config.paths.l2.join("31TCH"));

        let site = Layout::new(&config.paths, "31TCH", Some("Toulouse"));
        assert_eq!(site.l1, config.paths.l1.join("Toulouse"));
        assert_eq!(site.work, config.paths.work.join("Toulouse").join("31TCH"));
    }

    #[test]
    fn test_run_chains_each_output() {
        let (_root, config) = setup(&["20200601", "20200602", "20200603"]);
        let layout = Layout::new(&config.paths, "31TCH", None);
        let pipeline = Pipeline::new(config, FakeMaja::new(true, 0));

        let report = pipeline.run(&request(), &RunOptions::default()).unwrap();
        let modes: Vec<Mode> = report.processed.iter().map(|(_, m)| *m).collect();
        assert_eq!(modes, vec![Mode::Backward, Mode::Nominal, Mode::Nominal]);
        assert!(report.skipped.is_empty());

        let calls = pipeline.processor().calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].mode, Mode::Backward);
        assert_eq!(calls[2].output_dir, layout.l2);
        assert_eq!(count_entries(&layout.l2), 3);
        assert_eq!(count_entries(&layout.work), 0);
    }

    #[test]
    fn test_second_run_has_nothing_to_do() {
        let (_root, config) = setup(&["20200601", "20200602"]);
        let pipeline = Pipeline::new(config, FakeMaja::new(true, 0));
        pipeline.run(&request(), &RunOptions::default()).unwrap();

        let report = pipeline.run(&request(), &RunOptions::default()).unwrap();
        assert_eq!(report.planned, 0);
        assert_eq!(pipeline.processor().calls.borrow().len(), 2);
    }

    #[test]
    fn test_missing_reference_skips_workplan() {
        let (_root, config) = setup(&["20200601", "20200602"]);
        let pipeline = Pipeline::new(config.clone(), FakeMaja::new(false, 0));
        let report = pipeline.run(&request(), &RunOptions::default()).unwrap();
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.contains("20200602"));

        let mut strict = config;
        strict.scheduling.abort_on_staging_error = true;
        let pipeline = Pipeline::new(strict, FakeMaja::new(false, 0));
        assert!(pipeline.run(&request(), &RunOptions::default()).is_err());
    }

    #[test]
    fn test_processor_failure_keeps_inputs() {
        let (_root, config) = setup(&["20200601", "20200602", "20200603"]);
        let layout = Layout::new(&config.paths, "31TCH", None);
        let pipeline = Pipeline::new(config, FakeMaja::new(false, 70));

        let err = pipeline.run(&request(), &RunOptions::default()).unwrap_err();
        assert!(err.to_string().contains("inputs kept"));
        assert_eq!(pipeline.processor().calls.borrow().len(), 1);
        assert_eq!(count_entries(&layout.work), 1);
    }

    #[test]
    fn test_dry_run_writes_plan_only() {
        let (root, config) = setup(&["20200601", "20200602"]);
        let plan_out = root.path().join("plan.json");
        let pipeline = Pipeline::new(config, FakeMaja::new(true, 0));
        let options = RunOptions {
            dry_run: true,
            plan_out: Some(plan_out.clone()),
            ..Default::default()
        };

        let report = pipeline.run(&request(), &options).unwrap();
        assert_eq!(report.planned, 2);
        assert!(report.processed.is_empty());
        // No CAMS files at all: one warning per workplan.
        assert_eq!(report.warnings.len(), 2);
        assert!(pipeline.processor().calls.borrow().is_empty());
        assert!(plan_out.is_file());
    }

    #[test]
    fn test_orbit_restricts_native_products() {
        let (root, config) = setup(&[]);
        let l1 = root.path().join("L1");
        for name in [
            "S2A_MSIL1C_20200601T105031_N0209_R051_T31TCH_20200601T112345.SAFE",
            "S2B_MSIL1C_20200603T104619_N0209_R008_T31TCH_20200603T121254.SAFE",
            "S2A_MSIL1C_20200611T105031_N0209_R051_T31TCH_20200611T112345.SAFE",
        ] {
            fs::create_dir(l1.join(name)).unwrap();
        }
        let pipeline = Pipeline::new(config, FakeMaja::new(true, 0));
        let options = RunOptions {
            dry_run: true,
            ..Default::default()
        };

        let all = pipeline.run(&request(), &options).unwrap();
        assert_eq!(all.planned, 3);
        let on_orbit = Request {
            orbit: Some(51),
            ..request()
        };
        let report = pipeline.run(&on_orbit, &options).unwrap();
        assert_eq!(report.planned, 2);
    }

    #[test]
    fn test_failed_cleanup_names_the_workplan() {
        let (_root, config) = setup(&["20200601"]);
        let maja = FakeMaja {
            consume_inputs: true,
            ..FakeMaja::new(true, 0)
        };
        let pipeline = Pipeline::new(config, maja);

        let err = pipeline.run(&request(), &RunOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to clean up staging of SENTINEL2A_20200601-105012-463_L1C_T31TCH_C_V1-0"
        );
        assert_eq!(pipeline.processor().calls.borrow().len(), 1);
    }

    #[test]
    fn test_empty_l1_is_fatal() {
        let (_root, config) = setup(&[]);
        let pipeline = Pipeline::new(config, FakeMaja::new(true, 0));
        let err = pipeline.run(&request(), &RunOptions::default()).unwrap_err();
        assert!(err.downcast_ref::<CatalogError>().is_some());
    }
}
