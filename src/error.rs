use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::product::Platform;

/// A name matched a naming convention but one of its fields could not be derived.
#[derive(Error, Debug, PartialEq)]
pub enum ClassificationError {
    #[error("Unknown product level for {0}")]
    UnknownLevel(String),
    #[error("Cannot determine tile ID: {0}")]
    MissingTile(String),
    #[error("Cannot determine acquisition date of {name}: {reason}")]
    InvalidDate { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Cannot find {pattern} in {}", dir.display())]
    NotFound { pattern: String, dir: PathBuf },
    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Cannot read product directory {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("No L1 product found in {}", .0.display())]
    Empty(PathBuf),
}

#[derive(Error, Debug, PartialEq)]
pub enum ScheduleError {
    #[error("No products between {start} and {end}")]
    NoProductsInWindow { start: NaiveDate, end: NaiveDate },
    #[error("Products of several platforms found for one tile: {0:?}")]
    MixedPlatforms(Vec<Platform>),
    #[error("max_backward_count must be at least 1")]
    InvalidBackwardCount,
    #[error("Every product between {start} and {end} is already processed")]
    NothingToProcess { start: NaiveDate, end: NaiveDate },
}

#[derive(Error, Debug)]
pub enum AuxiliaryError {
    #[error("No DTM found for tile {0}")]
    DtmNotFound(String),
    #[error("{count} DTMs found for tile {tile}, expected exactly one")]
    DuplicateDtm { tile: String, count: usize },
    #[error("Cannot read auxiliary directory {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("I/O error while staging {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} already exists and is not a link to {}", path.display(), target.display())]
    Conflict { path: PathBuf, target: PathBuf },
    #[error("No valid L2 reference product found for {0}")]
    MissingReference(NaiveDateTime),
    #[error("Input {} has no file name to link under", .0.display())]
    Unnamed(PathBuf),
    #[error("Input {} has no usable metadata: {source}", path.display())]
    Metadata {
        path: PathBuf,
        source: MetadataError,
    },
    #[error("Staging directory {} holds {found} entries, expected {expected}", dir.display())]
    Incomplete {
        dir: PathBuf,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Cannot launch {}: {source}", exe.display())]
    Spawn {
        exe: PathBuf,
        source: std::io::Error,
    },
    #[error("{program} exited with code {code}")]
    Failed { program: String, code: i32 },
    #[error("{0} was terminated by a signal")]
    Terminated(String),
    #[error("Cannot read output of {program}: {source}")]
    Output {
        program: String,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{key} is missing: {}", path.display())]
    MissingPath { key: &'static str, path: PathBuf },
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
