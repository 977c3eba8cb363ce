#[cfg(feature = "cli")]
pub mod cli;
pub mod pipeline_conf;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command, ConfArgs, LogFormat};
pub use pipeline_conf::PipelineConf;
