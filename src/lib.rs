pub mod auxiliary;
pub mod catalog;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod product;
pub mod staging;
pub mod workplan;
