use crate::utils::error::{DataflowError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// 回傳 payload 中缺少的 key（排序後）
pub fn missing_keys(payload: &Map<String, Value>, expected: &[&str]) -> Vec<String> {
    expected
        .iter()
        .filter(|key| !payload.contains_key(**key))
        .map(|key| key.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// 檢查必要欄位，缺少時回傳 MissingMandatoryKeysError
pub fn check_mandatory_keys(
    context: &str,
    payload: &Map<String, Value>,
    mandatory: &[&str],
) -> Result<()> {
    let missing = missing_keys(payload, mandatory);
    if missing.is_empty() {
        tracing::debug!("all mandatory keys {:?} exist for {}", mandatory, context);
        return Ok(());
    }

    tracing::info!("mandatory missing keys= {:?}", missing);
    Err(DataflowError::MissingMandatoryKeysError {
        context: context.to_string(),
        keys: missing,
    })
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(DataflowError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(DataflowError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// `table` 或 `database.table`，每段只能是英數字與底線
pub fn validate_table_name(field_name: &str, name: &str) -> Result<()> {
    let parts: Vec<&str> = name.split('.').collect();
    let well_formed = parts.len() <= 3
        && parts.iter().all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if !well_formed {
        return Err(DataflowError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: name.to_string(),
            reason: "Expected [catalog.]database.table made of letters, digits and '_'"
                .to_string(),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| DataflowError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DataflowError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}
