//! Pipeline plan: which flows write into which tables.
//!
//! A plan is built from the selected dataflow specs of one layer. Every spec owns
//! one target table written by its primary flow; append flows add more sources to
//! the same target. A source that feeds several targets is a fan-out.

use crate::core::metadata_parser;
use crate::domain::metadata::{CdcApplyChanges, DataQualityExpectations, Sink, SinkFormat};
use crate::domain::model::{BronzeDataflowSpec, DataflowSpec, Layer, Options, SilverDataflowSpec};
use crate::domain::ports::SecretStore;
use crate::utils::error::{DataflowError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const UNKNOWN: &str = "<unknown>";
const REDACTED: &str = "***";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WriteMode {
    Append,
    ApplyChanges { cdc: CdcApplyChanges },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Primary,
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowPlan {
    pub name: String,
    pub kind: FlowKind,
    pub source: String,
    pub source_format: String,
    pub once: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkPlan {
    pub name: String,
    pub format: SinkFormat,
    pub options: BTreeMap<String, String>,
}

impl From<Sink> for SinkPlan {
    fn from(sink: Sink) -> Self {
        let options = sink
            .options
            .into_iter()
            .map(|(key, value)| {
                if is_sensitive_option(&key) {
                    (key, REDACTED.to_string())
                } else {
                    (key, value)
                }
            })
            .collect();
        Self {
            name: sink.name,
            format: sink.format,
            options,
        }
    }
}

fn is_sensitive_option(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key == Sink::KAFKA_BOOTSTRAP_SERVERS
        || key.contains("password")
        || key.contains("secret")
        || key.contains("jaas")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePlan {
    pub data_flow_id: String,
    pub data_flow_group: String,
    pub version: String,
    pub target: String,
    pub target_format: String,
    pub source: String,
    pub source_format: String,
    pub write_mode: WriteMode,
    pub partition_columns: Option<Vec<String>>,
    pub expectations: Option<DataQualityExpectations>,
    pub quarantine_target: Option<String>,
    pub flows: Vec<FlowPlan>,
    pub sinks: Vec<SinkPlan>,
    pub select_exp: Option<Vec<String>>,
    pub where_clause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelinePlan {
    pub layer: Layer,
    pub tables: Vec<TablePlan>,
    /// 來源 → 目標表，只列出餵給多張表的來源
    pub fan_out: BTreeMap<String, Vec<String>>,
    /// 目標表 → flow 名稱，只列出有多個 flow 寫入的表
    pub merged_targets: BTreeMap<String, Vec<String>>,
}

impl PipelinePlan {
    pub fn table(&self, target: &str) -> Option<&TablePlan> {
        self.tables.iter().find(|t| t.target == target)
    }

    pub fn flow_count(&self) -> usize {
        self.tables.iter().map(|t| t.flows.len()).sum()
    }
}

fn non_blank<'a>(details: &'a Options, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| details.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

/// `catalog.database.table`，沒有 table 時退回 path
pub fn target_name(details: Option<&Options>) -> Option<String> {
    let details = details?;
    match non_blank(details, &["table"]) {
        Some(table) => {
            let qualified: Vec<&str> = [
                non_blank(details, &["catalog"]),
                non_blank(details, &["database"]),
                Some(table),
            ]
            .into_iter()
            .flatten()
            .collect();
            Some(qualified.join("."))
        }
        None => non_blank(details, &["path"]).map(str::to_string),
    }
}

/// 來源識別：`database.table`，否則 path、topic、eventhub 名稱
pub fn source_name(details: Option<&Options>) -> String {
    let Some(details) = details else {
        return UNKNOWN.to_string();
    };

    let database = non_blank(details, &["database", "source_database"]);
    let table = non_blank(details, &["table", "source_table"]);
    match (database, table) {
        (Some(database), Some(table)) => return format!("{}.{}", database, table),
        (None, Some(table)) => return table.to_string(),
        _ => {}
    }

    non_blank(details, &["path", "source_path"])
        .or_else(|| non_blank(details, &["subscribe", "topic"]))
        .or_else(|| non_blank(details, &["eventhub.name"]))
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// 多個 where 條件以 AND 串接
pub fn combine_where_clause(clauses: Option<&[String]>) -> Option<String> {
    let parts: Vec<&str> = clauses?
        .iter()
        .map(|clause| clause.trim())
        .filter(|clause| !clause.is_empty())
        .collect();

    match parts.as_slice() {
        [] => None,
        [single] => Some(single.to_string()),
        many => Some(
            many.iter()
                .map(|clause| format!("({})", clause))
                .collect::<Vec<_>>()
                .join(" AND "),
        ),
    }
}

fn last_segment(name: &str) -> &str {
    name.rsplit(['.', '/']).find(|s| !s.is_empty()).unwrap_or(name)
}

pub struct PipelinePlanner<'a> {
    secrets: &'a dyn SecretStore,
}

impl<'a> PipelinePlanner<'a> {
    pub fn new(secrets: &'a dyn SecretStore) -> Self {
        Self { secrets }
    }

    pub fn plan_bronze(&self, specs: &[BronzeDataflowSpec]) -> Result<PipelinePlan> {
        let mut problems = Vec::new();
        let mut tables = Vec::with_capacity(specs.len());

        for spec in specs {
            let Some(mut table) = self.plan_common(spec, &mut problems) else {
                continue;
            };
            table.quarantine_target = target_name(spec.quarantine_target_details.as_ref());

            let quarantines = table
                .expectations
                .as_ref()
                .is_some_and(DataQualityExpectations::has_quarantine_rules);
            if quarantines && table.quarantine_target.is_none() {
                problems.push(format!(
                    "dataflow {}: expect_or_quarantine rules need quarantineTargetDetails",
                    spec.data_flow_id
                ));
            }
            tables.push(table);
        }

        Self::finish(Layer::Bronze, tables, problems)
    }

    pub fn plan_silver(&self, specs: &[SilverDataflowSpec]) -> Result<PipelinePlan> {
        let mut problems = Vec::new();
        let mut tables = Vec::with_capacity(specs.len());

        for spec in specs {
            let Some(mut table) = self.plan_common(spec, &mut problems) else {
                continue;
            };

            if let Some(select_exp) = &spec.select_exp {
                if select_exp.iter().any(|exp| exp.trim().is_empty()) {
                    problems.push(format!(
                        "dataflow {}: selectExp contains an empty expression",
                        spec.data_flow_id
                    ));
                }
            }
            if table
                .expectations
                .as_ref()
                .is_some_and(DataQualityExpectations::has_quarantine_rules)
            {
                problems.push(format!(
                    "dataflow {}: expect_or_quarantine is only supported on bronze",
                    spec.data_flow_id
                ));
            }

            table.select_exp = spec.select_exp.clone();
            table.where_clause = combine_where_clause(spec.where_clause.as_deref());
            tables.push(table);
        }

        Self::finish(Layer::Silver, tables, problems)
    }

    fn plan_common(&self, spec: &dyn DataflowSpec, problems: &mut Vec<String>) -> Option<TablePlan> {
        let id = spec.data_flow_id();
        let mut record = |result: Result<()>| {
            if let Err(e) = result {
                problems.push(format!("dataflow {}: {}", id, e));
            }
        };

        // 沒有目標表時仍繼續檢查其餘 metadata，最後才略過這個 spec
        let target = target_name(spec.target_details());
        if target.is_none() {
            record(Err(DataflowError::metadata(
                "target details",
                "needs a table or path",
            )));
        }
        let target_label = target.as_deref().unwrap_or(UNKNOWN);

        let mut write_mode = WriteMode::Append;
        if let Some(raw) = spec.cdc_apply_changes().filter(|raw| !raw.trim().is_empty()) {
            match metadata_parser::get_cdc_apply_changes(raw) {
                Ok(cdc) => write_mode = WriteMode::ApplyChanges { cdc },
                Err(e) => record(Err(e)),
            }
        }

        let mut expectations = None;
        if let Some(raw) = spec
            .data_quality_expectations()
            .filter(|raw| !raw.trim().is_empty())
        {
            match metadata_parser::get_data_quality_expectations(raw) {
                Ok(dqe) => expectations = Some(dqe),
                Err(e) => record(Err(e)),
            }
        }

        let source = source_name(spec.source_details());
        let primary_name = match &write_mode {
            WriteMode::ApplyChanges { cdc } => cdc.flow_name.clone(),
            WriteMode::Append => None,
        }
        .unwrap_or_else(|| format!("{}_flow", last_segment(target_label)));

        let mut flows = vec![FlowPlan {
            name: primary_name,
            kind: FlowKind::Primary,
            source,
            source_format: spec.source_format().to_string(),
            once: matches!(&write_mode, WriteMode::ApplyChanges { cdc } if cdc.once),
        }];

        if let Some(raw) = spec.append_flows().filter(|raw| !raw.trim().is_empty()) {
            match metadata_parser::get_append_flows(raw) {
                Ok(append_flows) => flows.extend(append_flows.into_iter().map(|flow| FlowPlan {
                    source: source_name(Some(&flow.source_details)),
                    name: flow.name,
                    kind: FlowKind::Append,
                    source_format: flow.source_format,
                    once: flow.once,
                })),
                Err(e) => record(Err(e)),
            }
        }

        let mut seen = BTreeSet::new();
        for flow in &flows {
            if !seen.insert(flow.name.as_str()) {
                record(Err(DataflowError::ValidationError {
                    message: format!(
                        "flow name '{}' is used twice for target {}",
                        flow.name, target_label
                    ),
                }));
            }
        }

        let mut sinks = Vec::new();
        if let Some(raw) = spec.sinks().filter(|raw| !raw.trim().is_empty()) {
            match metadata_parser::get_sinks(raw, self.secrets) {
                Ok(parsed) => sinks = parsed,
                Err(e) => record(Err(e)),
            }
        }
        let mut sink_names = BTreeSet::new();
        for sink in &sinks {
            if !sink_names.insert(sink.name.clone()) {
                record(Err(DataflowError::ValidationError {
                    message: format!("sink name '{}' is used twice", sink.name),
                }));
            }
        }

        let target = target?;
        Some(TablePlan {
            data_flow_id: id.to_string(),
            data_flow_group: spec.data_flow_group().to_string(),
            version: spec.version().to_string(),
            source: flows[0].source.clone(),
            source_format: spec.source_format().to_string(),
            target,
            target_format: spec.target_format().to_string(),
            write_mode,
            partition_columns: metadata_parser::get_partition_cols(spec.partition_columns()),
            expectations,
            quarantine_target: None,
            flows,
            sinks: sinks.into_iter().map(SinkPlan::from).collect(),
            select_exp: None,
            where_clause: None,
        })
    }

    fn finish(layer: Layer, tables: Vec<TablePlan>, mut problems: Vec<String>) -> Result<PipelinePlan> {
        let mut owners: HashMap<&str, Vec<&str>> = HashMap::new();
        for table in &tables {
            owners
                .entry(table.target.as_str())
                .or_default()
                .push(table.data_flow_id.as_str());
        }
        let mut duplicates: Vec<String> = owners
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(target, ids)| {
                format!(
                    "target {} is written by dataflows {}; use append flows to merge sources",
                    target,
                    ids.join(", ")
                )
            })
            .collect();
        duplicates.sort();
        problems.extend(duplicates);

        if !problems.is_empty() {
            for problem in &problems {
                tracing::warn!("⚠️ {}", problem);
            }
            return Err(DataflowError::PlanValidationError { problems });
        }

        let mut sources: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for table in &tables {
            for flow in &table.flows {
                sources
                    .entry(flow.source.clone())
                    .or_default()
                    .insert(table.target.clone());
            }
        }
        let fan_out = sources
            .into_iter()
            .filter(|(source, targets)| targets.len() > 1 && source != UNKNOWN)
            .map(|(source, targets)| (source, targets.into_iter().collect()))
            .collect();

        let merged_targets = tables
            .iter()
            .filter(|table| table.flows.len() > 1)
            .map(|table| {
                (
                    table.target.clone(),
                    table.flows.iter().map(|flow| flow.name.clone()).collect(),
                )
            })
            .collect();

        let plan = PipelinePlan {
            layer,
            tables,
            fan_out,
            merged_targets,
        };
        tracing::info!(
            "📋 {} plan: {} tables, {} flows, {} fan-out sources, {} merged targets",
            layer,
            plan.tables.len(),
            plan.flow_count(),
            plan.fan_out.len(),
            plan.merged_targets.len()
        );
        Ok(plan)
    }
}
