use crate::utils::error::{DataflowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// dataflow spec 表中的一列原始資料
pub type SpecRow = serde_json::Map<String, serde_json::Value>;

pub type Options = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = DataflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bronze" => Ok(Layer::Bronze),
            "silver" => Ok(Layer::Silver),
            other => Err(DataflowError::InvalidConfigValueError {
                field: "layer".to_string(),
                value: other.to_string(),
                reason: "Supported layers: bronze, silver".to_string(),
            }),
        }
    }
}

/// 寫入 bronze 層用的 dataflow spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BronzeDataflowSpec {
    pub data_flow_id: String,
    pub data_flow_group: String,
    pub source_format: String,
    pub source_details: Option<Options>,
    pub reader_config_options: Option<Options>,
    pub target_format: String,
    pub target_details: Option<Options>,
    pub table_properties: Option<Options>,
    pub schema: Option<String>,
    pub partition_columns: Option<Vec<String>>,
    pub cdc_apply_changes: Option<String>,
    pub data_quality_expectations: Option<String>,
    pub quarantine_target_details: Option<Options>,
    pub quarantine_table_properties: Option<Options>,
    pub append_flows: Option<String>,
    pub append_flows_schemas: Option<Options>,
    pub sinks: Option<String>,
    pub version: String,
    pub create_date: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub update_date: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

/// 寫入 silver 層用的 dataflow spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilverDataflowSpec {
    pub data_flow_id: String,
    pub data_flow_group: String,
    pub source_format: String,
    pub source_details: Option<Options>,
    pub reader_config_options: Option<Options>,
    pub target_format: String,
    pub target_details: Option<Options>,
    pub table_properties: Option<Options>,
    pub select_exp: Option<Vec<String>>,
    pub where_clause: Option<Vec<String>>,
    pub partition_columns: Option<Vec<String>>,
    pub cdc_apply_changes: Option<String>,
    pub data_quality_expectations: Option<String>,
    pub append_flows: Option<String>,
    pub append_flows_schemas: Option<Options>,
    pub sinks: Option<String>,
    pub version: String,
    pub create_date: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub update_date: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

/// 兩層 spec 共用的欄位，planner 透過這個介面讀取
pub trait DataflowSpec {
    fn layer(&self) -> Layer;
    fn data_flow_id(&self) -> &str;
    fn data_flow_group(&self) -> &str;
    fn source_format(&self) -> &str;
    fn source_details(&self) -> Option<&Options>;
    fn target_format(&self) -> &str;
    fn target_details(&self) -> Option<&Options>;
    fn partition_columns(&self) -> Option<&[String]>;
    fn cdc_apply_changes(&self) -> Option<&str>;
    fn data_quality_expectations(&self) -> Option<&str>;
    fn append_flows(&self) -> Option<&str>;
    fn sinks(&self) -> Option<&str>;
    fn version(&self) -> &str;
}

macro_rules! impl_dataflow_spec {
    ($ty:ty, $layer:expr) => {
        impl DataflowSpec for $ty {
            fn layer(&self) -> Layer {
                $layer
            }
            fn data_flow_id(&self) -> &str {
                &self.data_flow_id
            }
            fn data_flow_group(&self) -> &str {
                &self.data_flow_group
            }
            fn source_format(&self) -> &str {
                &self.source_format
            }
            fn source_details(&self) -> Option<&Options> {
                self.source_details.as_ref()
            }
            fn target_format(&self) -> &str {
                &self.target_format
            }
            fn target_details(&self) -> Option<&Options> {
                self.target_details.as_ref()
            }
            fn partition_columns(&self) -> Option<&[String]> {
                self.partition_columns.as_deref()
            }
            fn cdc_apply_changes(&self) -> Option<&str> {
                self.cdc_apply_changes.as_deref()
            }
            fn data_quality_expectations(&self) -> Option<&str> {
                self.data_quality_expectations.as_deref()
            }
            fn append_flows(&self) -> Option<&str> {
                self.append_flows.as_deref()
            }
            fn sinks(&self) -> Option<&str> {
                self.sinks.as_deref()
            }
            fn version(&self) -> &str {
                &self.version
            }
        }
    };
}

impl_dataflow_spec!(BronzeDataflowSpec, Layer::Bronze);
impl_dataflow_spec!(SilverDataflowSpec, Layer::Silver);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_layer_from_str() {
        assert_eq!("Bronze".parse::<Layer>().unwrap(), Layer::Bronze);
        assert_eq!(" silver ".parse::<Layer>().unwrap(), Layer::Silver);
        assert!("gold".parse::<Layer>().is_err());
    }

    #[test]
    fn test_silver_row_without_optional_columns() {
        let row = json!({
            "dataFlowId": "101",
            "dataFlowGroup": "A1",
            "sourceFormat": "delta",
            "sourceDetails": {"database": "bronze", "table": "customers"},
            "targetFormat": "delta",
            "targetDetails": {"database": "silver", "table": "customers"},
            "selectExp": ["id", "name"],
            "whereClause": ["id IS NOT NULL"],
            "version": "v1",
            "createDate": "2024-05-01T10:00:00Z",
            "someBookkeepingColumn": 42
        });

        let spec: SilverDataflowSpec = serde_json::from_value(row).unwrap();
        assert_eq!(spec.data_flow_id, "101");
        assert!(spec.append_flows.is_none());
        assert!(spec.data_quality_expectations.is_none());
        assert_eq!(spec.layer(), Layer::Silver);
        assert!(spec.create_date.is_some());
    }

    #[test]
    fn test_bronze_row_requires_identity_columns() {
        let row = json!({
            "dataFlowGroup": "A1",
            "sourceFormat": "cloudFiles",
            "targetFormat": "delta",
            "version": "v1"
        });
        assert!(serde_json::from_value::<BronzeDataflowSpec>(row).is_err());
    }
}
