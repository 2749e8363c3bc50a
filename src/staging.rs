use crate::catalog::Catalog;
use crate::error::StagingError;
use crate::product::Product;
use crate::workplan::{resolve_reference, Inputs, Reference, ReferencePolicy, Workplan};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Staging directory name for a primary product. Stable across runs.
pub fn dirname(base: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    format!("Start_maja_{}", hex::encode(hasher.finalize()))
}

/// Builds one isolated input directory per workplan under `work_dir`.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    work_dir: PathBuf,
    gipp: Vec<PathBuf>,
    policy: ReferencePolicy,
}

impl ContextBuilder {
    pub fn new(work_dir: PathBuf, gipp: Vec<PathBuf>, policy: ReferencePolicy) -> Self {
        Self {
            work_dir,
            gipp,
            policy,
        }
    }

    pub fn staging_dir(&self, workplan: &Workplan) -> PathBuf {
        self.work_dir.join(dirname(workplan.primary().name()))
    }

    /// Link every input of `workplan` into a fresh directory.
    ///
    /// A pending Nominal reference is resolved against `l2` here. Fails when
    /// the staging directory is left over from a previous run, or when two
    /// inputs claim the same name.
    pub fn stage(&self, workplan: &Workplan, l2: &Catalog) -> Result<StagingContext, StagingError> {
        let (inputs, reference) = self.inputs(workplan, l2)?;

        let dir = self.staging_dir(workplan);
        fs::create_dir_all(&self.work_dir).map_err(|source| StagingError::Io {
            path: self.work_dir.clone(),
            source,
        })?;
        fs::create_dir(&dir).map_err(|source| StagingError::Io {
            path: dir.clone(),
            source,
        })?;

        if let Err(e) = populate(&dir, &inputs) {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }
        info!(
            "Staged {} {} inputs in {}",
            inputs.len(),
            workplan.mode(),
            dir.display()
        );
        Ok(StagingContext {
            dir,
            inputs,
            reference,
        })
    }

    fn inputs(
        &self,
        workplan: &Workplan,
        l2: &Catalog,
    ) -> Result<(Vec<PathBuf>, Option<Product>), StagingError> {
        let mut inputs = entries(workplan.primary())?;
        let mut reference = None;
        match workplan.inputs() {
            Inputs::Init => {}
            Inputs::Backward(followers) => {
                for follower in followers {
                    inputs.extend(entries(follower)?);
                }
            }
            Inputs::Nominal(Reference::Resolved(l2_product)) => {
                inputs.extend(entries(l2_product)?);
                reference = Some(l2_product.clone());
            }
            Inputs::Nominal(Reference::Pending { date }) => {
                let l2_product = resolve_reference(l2.products(), *date, self.policy)
                    .ok_or(StagingError::MissingReference(*date))?;
                debug!("Reference for {}: {}", workplan.primary().name(), l2_product.name());
                inputs.extend(entries(l2_product)?);
                reference = Some(l2_product.clone());
            }
        }

        let auxiliary = workplan.auxiliary();
        if let Some(dtm) = &auxiliary.dtm {
            inputs.extend(dtm.entries());
        }
        for cams in &auxiliary.cams {
            inputs.extend(cams.entries());
        }
        inputs.extend(self.gipp.iter().cloned());
        Ok((inputs, reference))
    }
}

fn entries(product: &Product) -> Result<Vec<PathBuf>, StagingError> {
    product
        .staging_entries()
        .map_err(|source| StagingError::Metadata {
            path: product.path().to_path_buf(),
            source,
        })
}

fn populate(dir: &Path, inputs: &[PathBuf]) -> Result<(), StagingError> {
    let mut expected = BTreeSet::new();
    for source in inputs {
        let name = source
            .file_name()
            .ok_or_else(|| StagingError::Unnamed(source.clone()))?;
        let target = dir.join(name);
        if target.symlink_metadata().is_ok() {
            // Same input listed twice, e.g. a follower that is also a reference.
            if fs::read_link(&target).ok().as_deref() == Some(source.as_path()) {
                continue;
            }
            return Err(StagingError::Conflict {
                path: target,
                target: source.clone(),
            });
        }
        std::os::unix::fs::symlink(source, &target).map_err(|e| StagingError::Io {
            path: target.clone(),
            source: e,
        })?;
        debug!("{} -> {}", target.display(), source.display());
        expected.insert(name.to_os_string());
    }

    let found = fs::read_dir(dir)
        .map_err(|source| StagingError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .count();
    if found != expected.len() {
        return Err(StagingError::Incomplete {
            dir: dir.to_path_buf(),
            expected: expected.len(),
            found,
        });
    }
    Ok(())
}

/// A populated staging directory, removed by [`StagingContext::teardown`].
#[derive(Debug)]
pub struct StagingContext {
    dir: PathBuf,
    inputs: Vec<PathBuf>,
    reference: Option<Product>,
}

impl StagingContext {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// The L2 product a Nominal workplan was staged with.
    pub fn reference(&self) -> Option<&Product> {
        self.reference.as_ref()
    }

    /// Remove the directory and its links. Link targets are left untouched.
    pub fn teardown(self) -> Result<(), StagingError> {
        fs::remove_dir_all(&self.dir).map_err(|source| StagingError::Io {
            path: self.dir.clone(),
            source,
        })?;
        debug!("Removed {}", self.dir.display());
        Ok(())
    }

    /// Leave the directory in place and return its path.
    pub fn keep(self) -> PathBuf {
        self.dir
    }
}
