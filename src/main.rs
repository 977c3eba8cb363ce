use clap::Parser;
use dataflow_meta::config::pipeline_conf::LAYER_KEY;
use dataflow_meta::config::{CliConfig, Command, ConfArgs, LogFormat};
use dataflow_meta::core::onboarding_template;
use dataflow_meta::core::plan::{FlowKind, PipelinePlan, WriteMode};
use dataflow_meta::domain::model::Layer;
use dataflow_meta::utils::error::ErrorSeverity;
use dataflow_meta::utils::{logger, validation::Validate};
use dataflow_meta::{
    DataflowError, DataflowSpecReader, EnvSecretStore, LocalSpecTable, PipelineConf,
    PipelinePlanner,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    match cli.log_format {
        LogFormat::Compact => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }
    tracing::debug!("CLI config: {:?}", cli);

    let outcome = match cli.command {
        Command::Validate { conf } => run_validate(&conf).await,
        Command::Plan { conf, json } => run_plan(&conf, json).await,
        Command::Render {
            template,
            vars,
            output,
        } => run_render(&template, &vars, &output),
    };

    if let Err(e) = outcome {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ dataflow-meta failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

fn load_conf(args: &ConfArgs) -> Result<PipelineConf, DataflowError> {
    tracing::info!("📁 Loading pipeline configuration from: {}", args.conf.display());
    let mut conf = PipelineConf::from_file(&args.conf)?;

    // 應用命令列覆蓋設定
    if let Some(layer) = &args.layer {
        conf.set(LAYER_KEY, layer.as_str());
    }
    conf.apply_overrides(&args.overrides)?;

    conf.validate()?;
    Ok(conf)
}

async fn build_plan(args: &ConfArgs) -> Result<PipelinePlan, DataflowError> {
    let conf = load_conf(args)?;
    let layer = conf.layer()?;

    let table = LocalSpecTable::new(conf.warehouse_path());
    let reader = DataflowSpecReader::new(table, conf);
    let secrets = EnvSecretStore;
    let planner = PipelinePlanner::new(&secrets);

    match layer {
        Layer::Bronze => planner.plan_bronze(&reader.get_bronze_dataflow_specs().await?),
        Layer::Silver => planner.plan_silver(&reader.get_silver_dataflow_specs().await?),
    }
}

async fn run_validate(args: &ConfArgs) -> Result<(), DataflowError> {
    let plan = build_plan(args).await?;
    tracing::info!("✅ Dataflow specs validated successfully");
    println!(
        "✅ {} {} dataflow spec(s) are valid ({} flows)",
        plan.tables.len(),
        plan.layer,
        plan.flow_count()
    );
    Ok(())
}

async fn run_plan(args: &ConfArgs, json: bool) -> Result<(), DataflowError> {
    let plan = build_plan(args).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        display_plan_summary(&plan);
    }
    Ok(())
}

fn run_render(
    template: &std::path::Path,
    vars: &[String],
    output: &std::path::Path,
) -> Result<(), DataflowError> {
    tracing::info!("📁 Rendering onboarding template: {}", template.display());
    let content = std::fs::read_to_string(template)?;
    let vars = onboarding_template::parse_vars(vars)?;
    let rendered = onboarding_template::render_template(&content, &vars)?;
    onboarding_template::write_rendered(output, &rendered)?;
    println!("✅ Onboarding file written to {}", output.display());
    Ok(())
}

fn display_plan_summary(plan: &PipelinePlan) {
    println!("📋 {} Pipeline Plan:", plan.layer);
    println!("  Tables: {}", plan.tables.len());
    println!("  Flows: {}", plan.flow_count());
    println!();

    for table in &plan.tables {
        println!(
            "🎯 {} ({}) <- dataflow {} [{}] {}",
            table.target, table.target_format, table.data_flow_id, table.data_flow_group, table.version
        );
        match &table.write_mode {
            WriteMode::Append => println!("  Mode: append"),
            WriteMode::ApplyChanges { cdc } => println!(
                "  Mode: apply changes (keys: {}, sequence_by: {}, scd_type: {})",
                cdc.keys.join(", "),
                cdc.sequence_by,
                cdc.scd_type
            ),
        }
        for flow in &table.flows {
            let kind = match flow.kind {
                FlowKind::Primary => "primary",
                FlowKind::Append => "append",
            };
            println!(
                "  Flow {} [{}]: {} ({}){}",
                flow.name,
                kind,
                flow.source,
                flow.source_format,
                if flow.once { " once" } else { "" }
            );
        }
        if let Some(columns) = &table.partition_columns {
            println!("  Partition columns: {}", columns.join(", "));
        }
        if let Some(expectations) = &table.expectations {
            println!("  Expectations: {} rule(s)", expectations.rule_count());
        }
        if let Some(quarantine) = &table.quarantine_target {
            println!("  Quarantine: {}", quarantine);
        }
        if let Some(select_exp) = &table.select_exp {
            println!("  Select: {}", select_exp.join(", "));
        }
        if let Some(where_clause) = &table.where_clause {
            println!("  Where: {}", where_clause);
        }
        for sink in &table.sinks {
            println!("  Sink {} ({:?}): {} option(s)", sink.name, sink.format, sink.options.len());
        }
        println!();
    }

    if !plan.fan_out.is_empty() {
        println!("🔀 Fan-out:");
        for (source, targets) in &plan.fan_out {
            println!("  {} -> {}", source, targets.join(", "));
        }
        println!();
    }

    if !plan.merged_targets.is_empty() {
        println!("🔗 Append-flow merges:");
        for (target, flows) in &plan.merged_targets {
            println!("  {} <- {}", target, flows.join(", "));
        }
        println!();
    }
}
