pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{EnvSecretStore, LocalSpecTable, StaticSecretStore};
pub use config::PipelineConf;
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use core::plan::{PipelinePlan, PipelinePlanner};
pub use core::spec_reader::DataflowSpecReader;
pub use utils::error::{DataflowError, Result};
