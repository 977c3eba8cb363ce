use crate::domain::model::SpecRow;
use crate::domain::ports::SpecTable;
use crate::utils::error::{DataflowError, Result};
use std::path::{Path, PathBuf};

/// 本機 warehouse 目錄下的 dataflow spec 表
///
/// `db.table` 對應 `<warehouse>/db/table.jsonl`，找不到時再試 `table.json`（JSON 陣列）。
#[derive(Debug, Clone)]
pub struct LocalSpecTable {
    warehouse_path: PathBuf,
}

impl LocalSpecTable {
    pub fn new(warehouse_path: impl Into<PathBuf>) -> Self {
        Self {
            warehouse_path: warehouse_path.into(),
        }
    }

    pub fn candidate_paths(&self, table: &str) -> Vec<PathBuf> {
        let mut dir = self.warehouse_path.clone();
        let mut parts: Vec<&str> = table.split('.').collect();
        let name = parts.pop().unwrap_or(table);
        for part in parts {
            dir.push(part);
        }
        vec![
            dir.join(format!("{}.jsonl", name)),
            dir.join(format!("{}.json", name)),
        ]
    }

    fn parse_json_lines(path: &Path, content: &str) -> Result<Vec<SpecRow>> {
        let mut rows = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(line)? {
                serde_json::Value::Object(row) => rows.push(row),
                other => {
                    return Err(DataflowError::ValidationError {
                        message: format!(
                            "{} line {}: expected a JSON object, got {}",
                            path.display(),
                            index + 1,
                            type_name(&other)
                        ),
                    })
                }
            }
        }
        Ok(rows)
    }

    fn parse_json_array(path: &Path, content: &str) -> Result<Vec<SpecRow>> {
        let items = match serde_json::from_str::<serde_json::Value>(content)? {
            serde_json::Value::Array(items) => items,
            other => {
                return Err(DataflowError::ValidationError {
                    message: format!(
                        "{}: expected a JSON array of rows, got {}",
                        path.display(),
                        type_name(&other)
                    ),
                })
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                serde_json::Value::Object(row) => Ok(row),
                other => Err(DataflowError::ValidationError {
                    message: format!(
                        "{} row {}: expected a JSON object, got {}",
                        path.display(),
                        index,
                        type_name(&other)
                    ),
                }),
            })
            .collect()
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl SpecTable for LocalSpecTable {
    async fn read_rows(&self, table: &str) -> Result<Vec<SpecRow>> {
        let candidates = self.candidate_paths(table);

        for path in &candidates {
            if !tokio::fs::try_exists(path).await? {
                continue;
            }
            tracing::debug!("Reading dataflow spec table {} from {}", table, path.display());
            let content = tokio::fs::read_to_string(path).await?;
            let rows = if path.extension().is_some_and(|ext| ext == "jsonl") {
                Self::parse_json_lines(path, &content)?
            } else {
                Self::parse_json_array(path, &content)?
            };
            tracing::info!("Loaded {} rows from {}", rows.len(), table);
            return Ok(rows);
        }

        Err(DataflowError::TableNotFoundError {
            table: table.to_string(),
            tried: candidates.iter().map(|p| p.display().to_string()).collect(),
        })
    }
}
