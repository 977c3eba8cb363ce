use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "dataflow-meta")]
#[command(about = "Read, validate and plan metadata-driven bronze/silver dataflows")]
pub struct CliConfig {
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, value_enum, default_value = "compact")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// 讀取 pipeline 設定的共用參數
#[derive(Debug, Clone, clap::Args)]
pub struct ConfArgs {
    /// Path to the pipeline configuration TOML file
    #[arg(short, long, default_value = "pipeline.toml")]
    pub conf: PathBuf,

    /// Layer to load (overrides `layer` in the configuration)
    #[arg(short, long)]
    pub layer: Option<String>,

    /// Override a configuration entry, e.g. --set bronze.group=A1
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check configuration, read the dataflow specs and validate all metadata
    Validate {
        #[command(flatten)]
        conf: ConfArgs,
    },

    /// Show the pipeline plan: target tables, flows, fan-out and merges
    Plan {
        #[command(flatten)]
        conf: ConfArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render an onboarding template into a JSON file
    Render {
        /// Template file containing placeholders
        #[arg(short, long)]
        template: PathBuf,

        /// Placeholder substitution, e.g. --var {uc_catalog_name}=main
        #[arg(long = "var", value_name = "PLACEHOLDER=VALUE")]
        vars: Vec<String>,

        /// Where to write the rendered JSON
        #[arg(short, long)]
        output: PathBuf,
    },
}
