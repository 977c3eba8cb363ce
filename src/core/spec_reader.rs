use crate::config::pipeline_conf::{PipelineConf, LAYER_KEY};
use crate::domain::model::{BronzeDataflowSpec, Layer, SilverDataflowSpec, SpecRow};
use crate::domain::ports::SpecTable;
use crate::utils::error::{DataflowError, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

const GROUP_COLUMN: &str = "dataFlowGroup";
const ID_COLUMN: &str = "dataFlowId";
const VERSION_COLUMN: &str = "version";

/// 確認 pipeline 設定足以挑出要執行的 dataflow
pub fn check_pipeline_conf(conf: &PipelineConf, layer: Layer) -> Result<()> {
    if conf.get_non_blank(LAYER_KEY).is_none() {
        return Err(DataflowError::ConfigValidationError {
            field: LAYER_KEY.to_string(),
            message: format!(
                "parameter '{}' is missing, set it to '{}'",
                LAYER_KEY, layer
            ),
        });
    }
    conf.layer()?;

    if conf.dataflowspec_table(layer).is_none() {
        return Err(DataflowError::MissingConfigError {
            field: format!("{}.dataflowspecTable", layer),
        });
    }

    if conf.group(layer).is_none() && conf.dataflow_ids(layer).is_none() {
        return Err(DataflowError::ConfigValidationError {
            field: format!("{}.group", layer),
            message: format!(
                "please provide {layer}.group or {layer}.dataflowIds (comma separated dataflow ids)"
            ),
        });
    }

    Ok(())
}

/// 解析逗號分隔的 dataflow id，去掉空白與引號
pub fn parse_dataflow_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|id| id.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn text_column<'a>(row: &'a SpecRow, column: &str, index: usize) -> Result<&'a str> {
    row.get(column)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| DataflowError::ValidationError {
            message: format!("row {} has no string column '{}'", index, column),
        })
}

/// 依 group 或 dataflow id 篩選，並只保留每個 (group, id) 的最新版本
///
/// group 與 ids 同時給定時以 group 為準。版本以字串比較；版本相同時保留表中先出現的那列。
/// 輸出順序為各 (group, id) 第一次出現的順序。
pub fn select_latest(
    rows: Vec<SpecRow>,
    group: Option<&str>,
    dataflow_ids: Option<&str>,
) -> Result<Vec<SpecRow>> {
    let ids = match (group, dataflow_ids) {
        (None, Some(raw)) => Some(parse_dataflow_ids(raw)),
        _ => None,
    };

    let mut latest: Vec<SpecRow> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for (index, row) in rows.into_iter().enumerate() {
        let row_group = text_column(&row, GROUP_COLUMN, index)?;
        let row_id = text_column(&row, ID_COLUMN, index)?;
        let row_version = text_column(&row, VERSION_COLUMN, index)?;

        let selected = match (group, &ids) {
            (Some(group), _) => row_group == group,
            (None, Some(ids)) => ids.iter().any(|id| id == row_id),
            (None, None) => true,
        };
        if !selected {
            continue;
        }

        let key = (row_group.to_string(), row_id.to_string());
        match positions.get(&key) {
            Some(&position) => {
                let current = text_column(&latest[position], VERSION_COLUMN, position)?;
                if row_version > current {
                    tracing::debug!(
                        "dataflow {}/{}: version {} supersedes {}",
                        key.0,
                        key.1,
                        row_version,
                        current
                    );
                    latest[position] = row;
                }
            }
            None => {
                positions.insert(key, latest.len());
                latest.push(row);
            }
        }
    }

    Ok(latest)
}

fn to_specs<T: DeserializeOwned>(rows: Vec<SpecRow>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            let id = row
                .get(ID_COLUMN)
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();
            serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
                DataflowError::metadata(format!("dataflow spec {}", id), e.to_string())
            })
        })
        .collect()
}

/// 從 dataflow spec 表讀出某一層要執行的 spec
pub struct DataflowSpecReader<T: SpecTable> {
    table: T,
    conf: PipelineConf,
}

impl<T: SpecTable> DataflowSpecReader<T> {
    pub fn new(table: T, conf: PipelineConf) -> Self {
        Self { table, conf }
    }

    pub fn conf(&self) -> &PipelineConf {
        &self.conf
    }

    /// 檢查設定、讀表、篩選最新版本
    pub async fn load_rows(&self, layer: Layer) -> Result<Vec<SpecRow>> {
        check_pipeline_conf(&self.conf, layer)?;

        let table_name = self
            .conf
            .dataflowspec_table(layer)
            .ok_or_else(|| DataflowError::MissingConfigError {
                field: format!("{}.dataflowspecTable", layer),
            })?;
        let group = self.conf.group(layer);
        let dataflow_ids = self.conf.dataflow_ids(layer);

        tracing::info!(
            "Reading {} dataflow specs from {} (group={:?}, dataflowIds={:?})",
            layer,
            table_name,
            group,
            dataflow_ids
        );

        let rows = self.table.read_rows(table_name).await?;
        let total = rows.len();
        let selected = select_latest(rows, group, dataflow_ids)?;
        tracing::info!("Selected {} of {} rows", selected.len(), total);
        Ok(selected)
    }

    pub async fn get_bronze_dataflow_specs(&self) -> Result<Vec<BronzeDataflowSpec>> {
        let specs: Vec<BronzeDataflowSpec> = to_specs(self.load_rows(Layer::Bronze).await?)?;
        tracing::debug!("bronze_dataflow_spec_list={:?}", specs);
        Ok(specs)
    }

    pub async fn get_silver_dataflow_specs(&self) -> Result<Vec<SilverDataflowSpec>> {
        let specs: Vec<SilverDataflowSpec> = to_specs(self.load_rows(Layer::Silver).await?)?;
        tracing::debug!("silver_dataflow_spec_list={:?}", specs);
        Ok(specs)
    }
}
