use crate::utils::error::{DataflowError, Result};
use regex::Regex;
use std::path::Path;

/// 解析 `PLACEHOLDER=VALUE` 形式的替換參數，保留給定順序
///
/// 同一個 placeholder 出現多次時，以最後的值為準，位置維持第一次出現的地方。
pub fn parse_vars<S: AsRef<str>>(raw_vars: &[S]) -> Result<Vec<(String, String)>> {
    let mut vars: Vec<(String, String)> = Vec::with_capacity(raw_vars.len());
    for raw in raw_vars {
        let raw = raw.as_ref();
        let (placeholder, value) = match raw.split_once('=') {
            Some((placeholder, value)) if !placeholder.is_empty() => (placeholder, value),
            _ => {
                return Err(DataflowError::InvalidConfigValueError {
                    field: "--var".to_string(),
                    value: raw.to_string(),
                    reason: "Expected PLACEHOLDER=VALUE".to_string(),
                })
            }
        };
        match vars.iter_mut().find(|(existing, _)| existing == placeholder) {
            Some(entry) => entry.1 = value.to_string(),
            None => vars.push((placeholder.to_string(), value.to_string())),
        }
    }
    Ok(vars)
}

/// 將模板中的 placeholder 依序替換成值，結果必須是合法 JSON
pub fn render_template(template: &str, vars: &[(String, String)]) -> Result<serde_json::Value> {
    let mut rendered = template.to_string();
    for (placeholder, value) in vars {
        rendered = rendered.replace(placeholder.as_str(), value);
    }

    let leftover = Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}")
        .map_err(|e| DataflowError::config(format!("invalid placeholder pattern: {}", e)))?;
    let unreplaced: Vec<&str> = leftover.find_iter(&rendered).map(|m| m.as_str()).collect();
    if !unreplaced.is_empty() {
        tracing::warn!("⚠️ Unreplaced placeholders in template: {:?}", unreplaced);
    }

    serde_json::from_str(&rendered).map_err(|e| {
        DataflowError::metadata("onboarding template", format!("rendered template is not valid JSON: {}", e))
    })
}

/// 以 4 格縮排寫出 JSON
pub fn write_rendered<P: AsRef<Path>>(path: P, value: &serde_json::Value) -> Result<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    serde::Serialize::serialize(value, &mut serializer)?;

    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&path, buffer)?;
    tracing::info!("📁 Rendered onboarding file written to {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"[
  {
    "data_flow_id": "100",
    "data_flow_group": "A1",
    "source_details": {"source_path_it": "{uc_volume_path}/customers"},
    "bronze_database_it": "{uc_catalog_name}.{bronze_schema}"
  }
]"#;

    fn vars() -> Vec<(String, String)> {
        parse_vars(&[
            "{uc_volume_path}=/Volumes/main/dlt/files",
            "{uc_catalog_name}=main",
            "{bronze_schema}=dlt_meta_bronze_it_1234",
        ])
        .unwrap()
    }

    #[test]
    fn test_render_template() {
        let value = render_template(TEMPLATE, &vars()).unwrap();
        assert_eq!(
            value[0]["source_details"]["source_path_it"],
            "/Volumes/main/dlt/files/customers"
        );
        assert_eq!(value[0]["bronze_database_it"], "main.dlt_meta_bronze_it_1234");
    }

    #[test]
    fn test_render_invalid_json() {
        let err = render_template("[{\"a\": {value}}]", &[]).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_parse_vars_rejects_missing_separator() {
        assert!(parse_vars(&["{catalog}"]).is_err());
        assert!(parse_vars(&["=main"]).is_err());
        let vars = parse_vars(&["{query}=a=b"]).unwrap();
        assert_eq!(vars, vec![("{query}".to_string(), "a=b".to_string())]);
    }

    #[test]
    fn test_substitution_follows_given_order() {
        let template = r#"{"path": "{volume}/raw"}"#;

        // {volume} 的值內含 {catalog}，後面的參數會再把它換掉
        let vars = parse_vars(&["{volume}=/Volumes/{catalog}/files", "{catalog}=main"]).unwrap();
        let value = render_template(template, &vars).unwrap();
        assert_eq!(value["path"], "/Volumes/main/files/raw");

        let vars = parse_vars(&["{catalog}=main", "{volume}=/Volumes/{catalog}/files"]).unwrap();
        let value = render_template(template, &vars).unwrap();
        assert_eq!(value["path"], "/Volumes/{catalog}/files/raw");
    }

    #[test]
    fn test_repeated_placeholder_keeps_last_value() {
        let vars = parse_vars(&["{a}=1", "{b}=2", "{a}=3"]).unwrap();
        assert_eq!(
            vars,
            vec![
                ("{a}".to_string(), "3".to_string()),
                ("{b}".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_write_rendered_uses_four_space_indent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/onboarding.json");
        let value = render_template(TEMPLATE, &vars()).unwrap();

        write_rendered(&path, &value).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("[\n    {\n        \""));
        let reparsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(reparsed, value);
    }
}
