use crate::domain::metadata::{
    options_from_map, AppendFlow, CdcApplyChanges, DataQualityExpectations, Sink, SinkFormat,
};
use crate::domain::model::Options;
use crate::domain::ports::SecretStore;
use crate::utils::error::{DataflowError, Result};
use crate::utils::validation::{check_mandatory_keys, missing_keys, Validate};
use serde_json::{Map, Value};

const MERGE_INFO: &str = "merge info";
const APPEND_FLOW: &str = "append flow";
const SINK: &str = "sink";
const EXPECTATIONS: &str = "data quality expectations";

fn parse_object(context: &str, raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(DataflowError::metadata(
            context,
            format!("expected a JSON object, got {}", other),
        )),
    }
}

fn parse_array(context: &str, raw: &str) -> Result<Vec<Map<String, Value>>> {
    let items = match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => items,
        other => {
            return Err(DataflowError::metadata(
                context,
                format!("expected a JSON array, got {}", other),
            ))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(DataflowError::metadata(
                context,
                format!("expected a JSON object element, got {}", other),
            )),
        })
        .collect()
}

fn decode<T: serde::de::DeserializeOwned>(context: &str, payload: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(payload))
        .map_err(|e| DataflowError::metadata(context, e.to_string()))
}

/// 解析 cdcApplyChanges 欄位的 JSON
pub fn get_cdc_apply_changes(raw: &str) -> Result<CdcApplyChanges> {
    tracing::debug!("actual mergeInfo={}", raw);
    let payload = parse_object(MERGE_INFO, raw)?;

    let missing = missing_keys(&payload, &CdcApplyChanges::ATTRIBUTES);
    tracing::debug!("missing cdc payload keys: {:?}", missing);
    check_mandatory_keys(MERGE_INFO, &payload, &CdcApplyChanges::MANDATORY_ATTRIBUTES)?;

    let changes: CdcApplyChanges = decode(MERGE_INFO, payload)?;
    changes.validate()?;
    tracing::info!("final mergeInfo={:?}", changes);
    Ok(changes)
}

/// 解析 appendFlows 欄位（JSON 陣列）
pub fn get_append_flows(raw: &str) -> Result<Vec<AppendFlow>> {
    tracing::debug!("actual appendFlow={}", raw);
    let payloads = parse_array(APPEND_FLOW, raw)?;

    let mut flows = Vec::with_capacity(payloads.len());
    for payload in payloads {
        check_mandatory_keys(APPEND_FLOW, &payload, &AppendFlow::MANDATORY_ATTRIBUTES)?;
        let flow: AppendFlow = decode(APPEND_FLOW, payload)?;
        if flow.name.trim().is_empty() {
            return Err(DataflowError::metadata(APPEND_FLOW, "name cannot be blank"));
        }
        tracing::info!("final appendFlow={:?}", flow);
        flows.push(flow);
    }
    Ok(flows)
}

/// sink 的 options 通常是 JSON 字串，也接受直接內嵌的物件
fn decode_sink_options(value: Value) -> Result<Options> {
    let object = match value {
        Value::String(raw) => parse_object(SINK, &raw)?,
        Value::Object(map) => map,
        other => {
            return Err(DataflowError::metadata(
                SINK,
                format!("options must be a JSON object or JSON string, got {}", other),
            ))
        }
    };

    Ok(options_from_map(object))
}

fn resolve_kafka_secrets(options: &mut Options, secrets: &dyn SecretStore) -> Result<()> {
    let scope = options.get(Sink::KAFKA_SECRET_SCOPE).cloned();
    let key = options.get(Sink::KAFKA_SECRET_KEY).cloned();

    if let (Some(scope), Some(key)) = (scope, key) {
        let servers = secrets.get(&scope, &key)?;
        options.insert(Sink::KAFKA_BOOTSTRAP_SERVERS.to_string(), servers);
        options.remove(Sink::KAFKA_SECRET_SCOPE);
        options.remove(Sink::KAFKA_SECRET_KEY);
        tracing::debug!("resolved kafka bootstrap servers from secret scope {}", scope);
    }
    Ok(())
}

/// 解析 sinks 欄位（JSON 陣列）並解析 kafka secret
pub fn get_sinks(raw: &str, secrets: &dyn SecretStore) -> Result<Vec<Sink>> {
    let payloads = parse_array(SINK, raw)?;

    let mut sinks = Vec::with_capacity(payloads.len());
    for mut payload in payloads {
        tracing::debug!("actual sink={:?}", payload);
        check_mandatory_keys(SINK, &payload, &Sink::MANDATORY_ATTRIBUTES)?;

        let format: SinkFormat = match payload.get("format") {
            Some(Value::String(format)) => format.parse()?,
            other => {
                return Err(DataflowError::UnsupportedSinkFormatError {
                    format: other.map(Value::to_string).unwrap_or_default(),
                })
            }
        };

        let name = match payload.remove("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            other => {
                return Err(DataflowError::metadata(
                    SINK,
                    format!("name must be a non-empty string, got {:?}", other),
                ))
            }
        };

        let mut options = decode_sink_options(payload.remove("options").unwrap_or(Value::Null))?;

        let unknown: Vec<&String> = payload
            .keys()
            .filter(|key| !Sink::MANDATORY_ATTRIBUTES.contains(&key.as_str()))
            .collect();
        if !unknown.is_empty() {
            return Err(DataflowError::metadata(
                SINK,
                format!("unknown keys {:?} for sink '{}'", unknown, name),
            ));
        }

        if format == SinkFormat::Kafka {
            resolve_kafka_secrets(&mut options, secrets)?;
        }

        let sink = Sink {
            name,
            format,
            options,
        };
        tracing::info!("final sink={} ({:?})", sink.name, sink.format);
        sinks.push(sink);
    }
    Ok(sinks)
}

/// 分區欄位：空陣列或只有一個空白值時視為沒有分區
pub fn get_partition_cols(partition_columns: Option<&[String]>) -> Option<Vec<String>> {
    match partition_columns {
        None | Some([]) => None,
        Some([single]) if single.trim().is_empty() => None,
        Some([single]) => Some(vec![single.clone()]),
        Some(columns) => Some(
            columns
                .iter()
                .filter(|column| !column.is_empty())
                .cloned()
                .collect(),
        ),
    }
}

/// 解析 dataQualityExpectations 欄位
pub fn get_data_quality_expectations(raw: &str) -> Result<DataQualityExpectations> {
    let payload = parse_object(EXPECTATIONS, raw)?;
    let expectations: DataQualityExpectations = decode(EXPECTATIONS, payload)?;
    expectations.validate()?;
    tracing::debug!("{} expectation rules loaded", expectations.rule_count());
    Ok(expectations)
}
