//! Processing decisions over a time series of L1 products.
//!
//! [`schedule`] is pure: it looks at the L1 and L2 catalogs as they are when
//! called and never touches the filesystem. Nominal workplans after the first
//! only commit to a reference *date*; the concrete L2 product is resolved at
//! staging time, since earlier workplans of the same run may produce it.
use crate::auxiliary::{AuxRecord, AuxiliaryLocator};
use crate::error::{AuxiliaryError, ScheduleError};
use crate::product::{Platform, Product};
use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Init,
    Backward,
    Nominal,
}

impl Mode {
    /// Mode argument understood by the processor.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Mode::Init => "L2INIT",
            Mode::Backward => "L2BACKWARD",
            Mode::Nominal => "L2NOMINAL",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Init => "INIT",
            Mode::Backward => "BACKWARD",
            Mode::Nominal => "NOMINAL",
        };
        write!(f, "{name}")
    }
}

/// The L2 product a Nominal workplan chains from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reference {
    Resolved(Product),
    /// Resolved against the L2 catalog at staging time.
    Pending { date: NaiveDateTime },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inputs {
    Init,
    /// Chronologically following L1 products, primary excluded.
    Backward(Vec<Product>),
    Nominal(Reference),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryInputs {
    pub dtm: Option<AuxRecord>,
    pub cams: Vec<AuxRecord>,
}

/// One scheduled invocation of the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workplan {
    primary: Product,
    inputs: Inputs,
    auxiliary: AuxiliaryInputs,
}

impl Workplan {
    pub fn new(primary: Product, inputs: Inputs) -> Self {
        Self {
            primary,
            inputs,
            auxiliary: AuxiliaryInputs::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        match self.inputs {
            Inputs::Init => Mode::Init,
            Inputs::Backward(_) => Mode::Backward,
            Inputs::Nominal(_) => Mode::Nominal,
        }
    }

    pub fn primary(&self) -> &Product {
        &self.primary
    }

    pub fn tile(&self) -> &str {
        self.primary.tile()
    }

    pub fn date(&self) -> NaiveDateTime {
        self.primary.date()
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    pub fn backward_set(&self) -> &[Product] {
        match &self.inputs {
            Inputs::Backward(followers) => followers,
            _ => &[],
        }
    }

    pub fn reference(&self) -> Option<&Reference> {
        match &self.inputs {
            Inputs::Nominal(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn auxiliary(&self) -> &AuxiliaryInputs {
        &self.auxiliary
    }

    fn detail(&self) -> String {
        match &self.inputs {
            Inputs::Init => "-".to_string(),
            Inputs::Backward(followers) => format!("{} following products", followers.len()),
            Inputs::Nominal(Reference::Resolved(l2)) => l2.name().to_string(),
            Inputs::Nominal(Reference::Pending { date }) => {
                format!("latest L2 before {}", date.format("%Y-%m-%d %H:%M"))
            }
        }
    }
}

/// Thresholds deciding whether an L2 product can serve as a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePolicy {
    /// Below this distance, an L2 product *is* the acquisition, not a reference.
    pub tolerance: Duration,
    pub max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Products in a Backward workplan, primary included.
    pub max_backward_count: usize,
    pub overwrite: bool,
    pub product_date_tolerance: Duration,
    pub max_reference_age: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
            max_backward_count: 8,
            overwrite: false,
            product_date_tolerance: Duration::hours(12),
            max_reference_age: Duration::days(30),
        }
    }
}

impl ScheduleSettings {
    pub fn reference_policy(&self) -> ReferencePolicy {
        ReferencePolicy {
            tolerance: self.product_date_tolerance,
            max_age: self.max_reference_age,
        }
    }
}

/// The L2 product nearest to `date` that is older than it by more than the
/// tolerance and by at most the maximum age.
pub fn resolve_reference<'a>(
    l2: &'a [Product],
    date: NaiveDateTime,
    policy: ReferencePolicy,
) -> Option<&'a Product> {
    l2.iter()
        .filter(|c| {
            let age = date - c.date();
            age > policy.tolerance && age <= policy.max_age
        })
        .min_by_key(|c| (date - c.date()).abs())
}

fn already_processed(l2: &[Product], product: &Product, tolerance: Duration) -> bool {
    l2.iter()
        .any(|c| (c.date() - product.date()).abs() <= tolerance)
}

/// Keep one product per acquisition day: the one with the greatest production
/// key, ties going to the later path. Input and output are chronological.
fn latest_per_day(window: Vec<&Product>) -> Vec<&Product> {
    let mut kept: BTreeMap<NaiveDate, &Product> = BTreeMap::new();
    for product in window {
        let day = product.date().date();
        match kept.get(&day).copied() {
            Some(current)
                if (current.production(), current.path())
                    > (product.production(), product.path()) =>
            {
                debug!("{} superseded by {}", product.name(), current.name());
            }
            Some(current) => {
                debug!("{} superseded by {}", current.name(), product.name());
                kept.insert(day, product);
            }
            None => {
                kept.insert(day, product);
            }
        }
    }
    kept.into_values().collect()
}

/// Decide a processing mode for every L1 product within the settings' window.
pub fn schedule(
    l1: &[Product],
    l2: &[Product],
    settings: &ScheduleSettings,
) -> Result<Schedule, ScheduleError> {
    if settings.max_backward_count == 0 {
        return Err(ScheduleError::InvalidBackwardCount);
    }
    let platforms: BTreeSet<Platform> = l1.iter().chain(l2).map(Product::platform).collect();
    if platforms.len() > 1 {
        return Err(ScheduleError::MixedPlatforms(platforms.into_iter().collect()));
    }

    let mut window: Vec<&Product> = l1
        .iter()
        .filter(|p| (settings.start..=settings.end).contains(&p.date().date()))
        .collect();
    window.sort_by(|a, b| a.chronological(b));
    let window = latest_per_day(window);
    if window.is_empty() {
        return Err(ScheduleError::NoProductsInWindow {
            start: settings.start,
            end: settings.end,
        });
    }

    let policy = settings.reference_policy();
    let mut schedule = Schedule::default();
    let mut last_processed: Option<NaiveDateTime> = None;
    for (index, product) in window.iter().enumerate() {
        if !settings.overwrite && already_processed(l2, product, policy.tolerance) {
            debug!("{} already processed, skipping", product.name());
            last_processed = Some(product.date());
            continue;
        }

        let inputs = if schedule.workplans.is_empty() {
            match resolve_reference(l2, product.date(), policy) {
                Some(reference) => Inputs::Nominal(Reference::Resolved(reference.clone())),
                None => schedule.fresh_start(&window[index..], settings.max_backward_count),
            }
        } else {
            match last_processed {
                Some(previous) if product.date() - previous < policy.max_age => {
                    Inputs::Nominal(Reference::Pending {
                        date: product.date(),
                    })
                }
                _ => {
                    info!("Time series broken before {}, starting over", product.name());
                    schedule.fresh_start(&window[index..], settings.max_backward_count)
                }
            }
        };
        schedule.workplans.push(Workplan::new((*product).clone(), inputs));
        last_processed = Some(product.date());
    }

    if schedule.workplans.is_empty() {
        return Err(ScheduleError::NothingToProcess {
            start: settings.start,
            end: settings.end,
        });
    }
    info!(
        "{} workplans scheduled for {} products in window",
        schedule.workplans.len(),
        window.len()
    );
    Ok(schedule)
}

/// The ordered workplan queue, with the warnings raised while building it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    workplans: Vec<Workplan>,
    warnings: Vec<String>,
}

impl Schedule {
    pub fn workplans(&self) -> &[Workplan] {
        &self.workplans
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.workplans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workplans.is_empty()
    }

    /// Backward when enough products follow `series[0]`, Init otherwise.
    fn fresh_start(&mut self, series: &[&Product], max_backward_count: usize) -> Inputs {
        if max_backward_count >= 2 && series.len() >= max_backward_count {
            let followers = series[1..max_backward_count]
                .iter()
                .map(|p| (*p).clone())
                .collect();
            return Inputs::Backward(followers);
        }
        let message = format!(
            "{}: {} products available for Backward, {} needed; processing in Init mode",
            series[0].name(),
            series.len(),
            max_backward_count
        );
        warn!("{}", message);
        self.warnings.push(message);
        Inputs::Init
    }

    /// Resolve the DTM of each tile and the CAMS files around each acquisition.
    pub fn attach_auxiliary(
        &mut self,
        locator: &AuxiliaryLocator,
        cams_window: Duration,
    ) -> Result<(), AuxiliaryError> {
        let mut dtms: BTreeMap<String, AuxRecord> = BTreeMap::new();
        for workplan in self.workplans.iter_mut() {
            let dtm = match dtms.get(workplan.tile()) {
                Some(dtm) => dtm.clone(),
                None => {
                    let dtm = locator.dtm_for(workplan.tile())?.clone();
                    dtms.insert(workplan.tile().to_string(), dtm.clone());
                    dtm
                }
            };
            let cams: Vec<AuxRecord> = locator
                .cams_for(workplan.date(), cams_window)
                .into_iter()
                .cloned()
                .collect();
            if cams.is_empty() {
                let message = format!(
                    "{}: no CAMS file found, processing without aerosol data",
                    workplan.primary().name()
                );
                warn!("{}", message);
                self.warnings.push(message);
            }
            workplan.auxiliary = AuxiliaryInputs {
                dtm: Some(dtm),
                cams,
            };
        }
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let schedule: Self = serde_json::from_str(&content)?;
        Ok(schedule)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "date | tile | mode | product | detail")?;
        for wp in &self.workplans {
            writeln!(
                f,
                "{} | {} | {} | {} | {}",
                wp.date().format("%Y-%m-%d %H:%M:%S"),
                wp.tile(),
                wp.mode(),
                wp.primary().name(),
                wp.detail()
            )?;
        }
        Ok(())
    }
}
