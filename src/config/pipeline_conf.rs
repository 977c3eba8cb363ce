use crate::domain::model::Layer;
use crate::utils::error::{DataflowError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

pub const LAYER_KEY: &str = "layer";
pub const WAREHOUSE_PATH_KEY: &str = "warehouse.path";
pub const DEFAULT_WAREHOUSE_PATH: &str = "./warehouse";

/// Pipeline 執行時的 key/value 設定
///
/// 跟 pipeline runtime 的 conf 一樣是扁平的字串表：`layer`、`bronze.dataflowspecTable`、
/// `bronze.group`、`bronze.dataflowIds` 等。TOML 中的巢狀 table 會攤平成以 `.` 連接的 key。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConf {
    values: BTreeMap<String, String>,
}

impl PipelineConf {
    pub fn new() -> Self {
        Self::default()
    }

    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        let table: toml::Table = toml::from_str(&processed_content)?;

        let mut conf = Self::new();
        Self::flatten("", &table, &mut conf.values);
        tracing::debug!("Loaded {} pipeline conf entries", conf.values.len());
        Ok(conf)
    }

    /// 替換環境變數 (例如 ${BRONZE_GROUP})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| DataflowError::config(format!("invalid env pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
        for (key, value) in table {
            let full_key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };

            match value {
                toml::Value::Table(nested) => Self::flatten(&full_key, nested, out),
                toml::Value::String(s) => {
                    out.insert(full_key, s.clone());
                }
                toml::Value::Array(items) => {
                    // dataflowIds = ["101", "102"] 等同 "101,102"
                    let joined = items
                        .iter()
                        .map(|item| match item {
                            toml::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    out.insert(full_key, joined);
                }
                other => {
                    out.insert(full_key, other.to_string());
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// 空白值視為未設定
    pub fn get_non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.trim().is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 解析 `key=value` 形式的覆蓋設定
    pub fn parse_override(raw: &str) -> Result<(String, String)> {
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(DataflowError::InvalidConfigValueError {
                field: "--set".to_string(),
                value: raw.to_string(),
                reason: "Expected key=value".to_string(),
            }),
        }
    }

    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<()> {
        for raw in overrides {
            let (key, value) = Self::parse_override(raw.as_ref())?;
            tracing::info!("🔧 conf override: {}={}", key, value);
            self.set(key, value);
        }
        Ok(())
    }

    pub fn layer(&self) -> Result<Layer> {
        self.get_non_blank(LAYER_KEY)
            .ok_or_else(|| DataflowError::MissingConfigError {
                field: LAYER_KEY.to_string(),
            })?
            .parse()
    }

    pub fn dataflowspec_table(&self, layer: Layer) -> Option<&str> {
        self.get_non_blank(&format!("{}.dataflowspecTable", layer))
    }

    pub fn group(&self, layer: Layer) -> Option<&str> {
        self.get_non_blank(&format!("{}.group", layer))
    }

    pub fn dataflow_ids(&self, layer: Layer) -> Option<&str> {
        self.get_non_blank(&format!("{}.dataflowIds", layer))
    }

    pub fn warehouse_path(&self) -> &str {
        self.get_non_blank(WAREHOUSE_PATH_KEY)
            .unwrap_or(DEFAULT_WAREHOUSE_PATH)
    }
}

impl Validate for PipelineConf {
    fn validate(&self) -> Result<()> {
        validation::validate_path(WAREHOUSE_PATH_KEY, self.warehouse_path())?;

        for layer in [Layer::Bronze, Layer::Silver] {
            if let Some(table) = self.dataflowspec_table(layer) {
                validation::validate_table_name(&format!("{}.dataflowspecTable", layer), table)?;
            }
        }

        if let Some(layer) = self.get(LAYER_KEY) {
            validation::validate_non_empty_string(LAYER_KEY, layer)?;
            layer.parse::<Layer>()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flat_and_nested_keys() {
        let content = r#"
layer = "bronze"
"bronze.dataflowspecTable" = "dlt_meta.bronze_dataflowspec"

[bronze]
group = "A1"

[warehouse]
path = "/data/warehouse"
"#;
        let conf = PipelineConf::from_toml_str(content).unwrap();
        assert_eq!(conf.layer().unwrap(), Layer::Bronze);
        assert_eq!(
            conf.dataflowspec_table(Layer::Bronze),
            Some("dlt_meta.bronze_dataflowspec")
        );
        assert_eq!(conf.group(Layer::Bronze), Some("A1"));
        assert_eq!(conf.warehouse_path(), "/data/warehouse");
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn test_array_and_scalar_values_are_stringified() {
        let content = r#"
[silver]
dataflowIds = ["101", 102]
maxFiles = 10
"#;
        let conf = PipelineConf::from_toml_str(content).unwrap();
        assert_eq!(conf.dataflow_ids(Layer::Silver), Some("101,102"));
        assert_eq!(conf.get("silver.maxFiles"), Some("10"));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("PIPELINE_CONF_TEST_GROUP", "A2");
        let conf = PipelineConf::from_toml_str(
            r#"
"bronze.group" = "${PIPELINE_CONF_TEST_GROUP}"
"bronze.dataflowIds" = "${PIPELINE_CONF_TEST_UNSET}"
"#,
        )
        .unwrap();
        std::env::remove_var("PIPELINE_CONF_TEST_GROUP");

        assert_eq!(conf.group(Layer::Bronze), Some("A2"));
        assert_eq!(
            conf.dataflow_ids(Layer::Bronze),
            Some("${PIPELINE_CONF_TEST_UNSET}")
        );
    }

    #[test]
    fn test_overrides() {
        let mut conf = PipelineConf::new();
        conf.apply_overrides(&["layer=silver", "silver.group = G1"]).unwrap();
        assert_eq!(conf.layer().unwrap(), Layer::Silver);
        assert_eq!(conf.group(Layer::Silver), Some("G1"));
        assert!(conf.apply_overrides(&["no-equals-sign"]).is_err());
        assert!(conf.apply_overrides(&["=value"]).is_err());
    }

    #[test]
    fn test_blank_values_are_absent() {
        let mut conf = PipelineConf::new();
        conf.set("bronze.group", "  ");
        assert_eq!(conf.group(Layer::Bronze), None);
        assert!(conf.layer().is_err());
        assert_eq!(conf.warehouse_path(), DEFAULT_WAREHOUSE_PATH);
    }

    #[test]
    fn test_invalid_table_name_fails_validation() {
        let mut conf = PipelineConf::new();
        conf.set("bronze.dataflowspecTable", "dlt meta.specs");
        assert!(conf.validate().is_err());
    }

    #[test]
    fn test_conf_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"layer = \"silver\"\n[silver]\ndataflowspecTable = \"db.silver_specs\"\n")
            .unwrap();

        let conf = PipelineConf::from_file(temp_file.path()).unwrap();
        assert_eq!(conf.dataflowspec_table(Layer::Silver), Some("db.silver_specs"));
    }
}
