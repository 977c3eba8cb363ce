use crate::domain::model::Options;
use crate::utils::error::{DataflowError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScdType {
    Type1,
    Type2,
}

impl fmt::Display for ScdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScdType::Type1 => f.write_str("1"),
            ScdType::Type2 => f.write_str("2"),
        }
    }
}

impl FromStr for ScdType {
    type Err = DataflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(ScdType::Type1),
            "2" => Ok(ScdType::Type2),
            other => Err(DataflowError::metadata(
                "merge info",
                format!("scd_type must be 1 or 2, got '{}'", other),
            )),
        }
    }
}

impl Serialize for ScdType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScdType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // 表中可能存字串 "2" 也可能是數字 2
        let raw = serde_json::Value::deserialize(deserializer)?;
        let text = match &raw {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "scd_type must be a string or integer, got {}",
                    other
                )))
            }
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// JSON 純量轉成字串；字串值原樣保留，其他值以 JSON 文字表示
pub fn option_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

pub fn options_from_map(map: serde_json::Map<String, serde_json::Value>) -> Options {
    map.into_iter()
        .map(|(key, value)| (key, option_text(value)))
        .collect()
}

fn string_options<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Options, D::Error> {
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(options_from_map(map))
}

fn optional_string_options<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Options>, D::Error> {
    let map = Option::<serde_json::Map<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(map.map(options_from_map))
}

// 明確寫 null 時視同未設定
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// CDC apply changes 設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CdcApplyChanges {
    pub keys: Vec<String>,
    pub sequence_by: String,
    #[serde(default)]
    pub r#where: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ignore_null_updates: bool,
    #[serde(default)]
    pub apply_as_deletes: Option<String>,
    #[serde(default)]
    pub apply_as_truncates: Option<String>,
    #[serde(default)]
    pub column_list: Option<Vec<String>>,
    #[serde(default)]
    pub except_column_list: Option<Vec<String>>,
    pub scd_type: ScdType,
    #[serde(default)]
    pub track_history_column_list: Option<Vec<String>>,
    #[serde(default)]
    pub track_history_except_column_list: Option<Vec<String>>,
    #[serde(default)]
    pub flow_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub once: bool,
    #[serde(default)]
    pub ignore_null_updates_column_list: Option<Vec<String>>,
    #[serde(default)]
    pub ignore_null_updates_except_column_list: Option<Vec<String>>,
}

impl CdcApplyChanges {
    pub const MANDATORY_ATTRIBUTES: [&'static str; 3] = ["keys", "sequence_by", "scd_type"];

    pub const ATTRIBUTES: [&'static str; 15] = [
        "keys",
        "sequence_by",
        "where",
        "ignore_null_updates",
        "apply_as_deletes",
        "apply_as_truncates",
        "column_list",
        "except_column_list",
        "scd_type",
        "track_history_column_list",
        "track_history_except_column_list",
        "flow_name",
        "once",
        "ignore_null_updates_column_list",
        "ignore_null_updates_except_column_list",
    ];
}

fn exclusive(context: &str, a: (&str, &Option<Vec<String>>), b: (&str, &Option<Vec<String>>)) -> Result<()> {
    if a.1.is_some() && b.1.is_some() {
        return Err(DataflowError::metadata(
            context,
            format!("{} and {} cannot both be set", a.0, b.0),
        ));
    }
    Ok(())
}

impl Validate for CdcApplyChanges {
    fn validate(&self) -> Result<()> {
        if self.keys.is_empty() || self.keys.iter().any(|k| k.trim().is_empty()) {
            return Err(DataflowError::metadata(
                "merge info",
                "keys must list at least one non-blank column",
            ));
        }
        if self.sequence_by.trim().is_empty() {
            return Err(DataflowError::metadata("merge info", "sequence_by cannot be blank"));
        }

        exclusive(
            "merge info",
            ("column_list", &self.column_list),
            ("except_column_list", &self.except_column_list),
        )?;
        exclusive(
            "merge info",
            ("track_history_column_list", &self.track_history_column_list),
            ("track_history_except_column_list", &self.track_history_except_column_list),
        )?;
        exclusive(
            "merge info",
            ("ignore_null_updates_column_list", &self.ignore_null_updates_column_list),
            (
                "ignore_null_updates_except_column_list",
                &self.ignore_null_updates_except_column_list,
            ),
        )?;

        let tracks_history = self.track_history_column_list.is_some()
            || self.track_history_except_column_list.is_some();
        if tracks_history && self.scd_type != ScdType::Type2 {
            return Err(DataflowError::metadata(
                "merge info",
                "track_history_* lists are only supported with scd_type 2",
            ));
        }

        Ok(())
    }
}

/// 額外寫入同一張目標表的 append flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendFlow {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub create_streaming_table: bool,
    pub source_format: String,
    #[serde(deserialize_with = "string_options")]
    pub source_details: Options,
    #[serde(default, deserialize_with = "optional_string_options")]
    pub reader_options: Option<Options>,
    #[serde(default, deserialize_with = "optional_string_options")]
    pub spark_conf: Option<Options>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub once: bool,
}

impl AppendFlow {
    pub const MANDATORY_ATTRIBUTES: [&'static str; 4] =
        ["name", "source_format", "create_streaming_table", "source_details"];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    Delta,
    Kafka,
}

impl SinkFormat {
    pub const SUPPORTED: [&'static str; 2] = ["delta", "kafka"];
}

impl FromStr for SinkFormat {
    type Err = DataflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "delta" => Ok(SinkFormat::Delta),
            "kafka" => Ok(SinkFormat::Kafka),
            other => Err(DataflowError::UnsupportedSinkFormatError {
                format: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sink {
    pub name: String,
    pub format: SinkFormat,
    pub options: Options,
}

impl Sink {
    pub const MANDATORY_ATTRIBUTES: [&'static str; 3] = ["name", "format", "options"];
    pub const KAFKA_SECRET_SCOPE: &'static str = "kafka_bootstrap_servers_secrets_scope";
    pub const KAFKA_SECRET_KEY: &'static str = "kafka_bootstrap_servers_secrets_key";
    pub const KAFKA_BOOTSTRAP_SERVERS: &'static str = "kafka.bootstrap.servers";
}

/// 資料品質規則：規則名稱對應 SQL 條件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataQualityExpectations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_or_drop: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_or_fail: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_or_quarantine: Option<BTreeMap<String, String>>,
}

impl DataQualityExpectations {
    pub fn rule_count(&self) -> usize {
        [
            &self.expect,
            &self.expect_or_drop,
            &self.expect_or_fail,
            &self.expect_or_quarantine,
        ]
        .iter()
        .map(|rules| rules.as_ref().map_or(0, BTreeMap::len))
        .sum()
    }

    pub fn has_quarantine_rules(&self) -> bool {
        self.expect_or_quarantine
            .as_ref()
            .is_some_and(|rules| !rules.is_empty())
    }
}

impl Validate for DataQualityExpectations {
    fn validate(&self) -> Result<()> {
        if self.rule_count() == 0 {
            return Err(DataflowError::metadata(
                "data quality expectations",
                "no expectation rules defined",
            ));
        }
        let all_rules = [
            &self.expect,
            &self.expect_or_drop,
            &self.expect_or_fail,
            &self.expect_or_quarantine,
        ];
        for (name, condition) in all_rules.iter().filter_map(|r| r.as_ref()).flatten() {
            if condition.trim().is_empty() {
                return Err(DataflowError::metadata(
                    "data quality expectations",
                    format!("rule '{}' has an empty condition", name),
                ));
            }
        }
        Ok(())
    }
}
