use anyhow::Result;
use dataflow_meta::core::plan::{FlowKind, WriteMode};
use dataflow_meta::domain::metadata::ScdType;
use dataflow_meta::{
    DataflowError, DataflowSpecReader, LocalSpecTable, PipelineConf, PipelinePlanner,
    StaticSecretStore,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_table(dir: &TempDir, database: &str, table: &str, rows: &[Value]) -> Result<()> {
    let db_dir = dir.path().join(database);
    std::fs::create_dir_all(&db_dir)?;
    let content = rows
        .iter()
        .map(|row| serde_json::to_string(row))
        .collect::<std::result::Result<Vec<_>, _>>()?
        .join("\n");
    std::fs::write(db_dir.join(format!("{}.jsonl", table)), content)?;
    Ok(())
}

fn bronze_row(id: &str, group: &str, table: &str, path: &str, version: &str) -> Value {
    json!({
        "dataFlowId": id,
        "dataFlowGroup": group,
        "sourceFormat": "cloudFiles",
        "sourceDetails": {"path": path},
        "readerConfigOptions": {"cloudFiles.format": "json"},
        "targetFormat": "delta",
        "targetDetails": {"database": "bronze", "table": table},
        "tableProperties": null,
        "schema": null,
        "partitionColumns": [""],
        "cdcApplyChanges": null,
        "dataQualityExpectations": null,
        "quarantineTargetDetails": null,
        "quarantineTableProperties": null,
        "sinks": null,
        "version": version,
        "createDate": "2024-05-01T10:00:00Z",
        "createdBy": "onboarding",
        "updateDate": "2024-05-01T10:00:00Z",
        "updatedBy": "onboarding"
    })
}

fn conf_file(dir: &TempDir, body: &str) -> Result<PipelineConf> {
    let normalized = dir.path().to_str().unwrap().replace('\\', "/");
    // 頂層 key 必須寫在任何 table 之前
    let content = format!("{}\n[warehouse]\npath = \"{}\"\n", body, normalized);
    let path = dir.path().join("pipeline.toml");
    std::fs::write(&path, content)?;
    Ok(PipelineConf::from_file(&path)?)
}

#[tokio::test]
async fn test_bronze_specs_latest_version_for_group() -> Result<()> {
    let dir = TempDir::new()?;
    write_table(
        &dir,
        "dlt_meta",
        "bronze_dataflowspec",
        &[
            bronze_row("100", "A1", "customers", "/landing/customers", "v1"),
            bronze_row("101", "A1", "transactions", "/landing/transactions", "v1"),
            bronze_row("100", "A1", "customers_v2", "/landing/customers", "v2"),
            bronze_row("200", "A2", "products", "/landing/products", "v1"),
        ],
    )?;

    let conf = conf_file(
        &dir,
        r#"
layer = "bronze"

[bronze]
dataflowspecTable = "dlt_meta.bronze_dataflowspec"
group = "A1"
"#,
    )?;

    let reader = DataflowSpecReader::new(LocalSpecTable::new(conf.warehouse_path()), conf.clone());
    let specs = reader.get_bronze_dataflow_specs().await?;

    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].data_flow_id, "100");
    assert_eq!(specs[0].version, "v2");
    assert_eq!(
        specs[0].target_details.as_ref().unwrap()["table"],
        "customers_v2"
    );
    assert_eq!(specs[1].data_flow_id, "101");
    assert!(specs.iter().all(|s| s.append_flows.is_none()));
    Ok(())
}

#[tokio::test]
async fn test_bronze_specs_by_dataflow_ids() -> Result<()> {
    let dir = TempDir::new()?;
    write_table(
        &dir,
        "dlt_meta",
        "bronze_dataflowspec",
        &[
            bronze_row("100", "A1", "customers", "/landing/customers", "v1"),
            bronze_row("101", "A1", "transactions", "/landing/transactions", "v1"),
            bronze_row("200", "A2", "products", "/landing/products", "v1"),
        ],
    )?;

    let mut conf = conf_file(
        &dir,
        "layer = \"bronze\"\n\"bronze.dataflowspecTable\" = \"dlt_meta.bronze_dataflowspec\"\n",
    )?;
    conf.apply_overrides(&["bronze.dataflowIds='100','200'"])?;

    let reader = DataflowSpecReader::new(LocalSpecTable::new(conf.warehouse_path()), conf.clone());
    let ids: Vec<String> = reader
        .get_bronze_dataflow_specs()
        .await?
        .into_iter()
        .map(|s| s.data_flow_id)
        .collect();

    assert_eq!(ids, vec!["100", "200"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_group_and_ids_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let conf = conf_file(
        &dir,
        "layer = \"silver\"\n[silver]\ndataflowspecTable = \"dlt_meta.silver_dataflowspec\"\n",
    )?;

    let reader = DataflowSpecReader::new(LocalSpecTable::new(conf.warehouse_path()), conf.clone());
    let err = reader.get_silver_dataflow_specs().await.unwrap_err();
    assert!(matches!(err, DataflowError::ConfigValidationError { .. }));
    Ok(())
}

#[tokio::test]
async fn test_bronze_plan_with_cdc_append_flow_and_kafka_sink() -> Result<()> {
    let dir = TempDir::new()?;
    let mut customers = bronze_row("100", "A1", "customers", "/landing/customers", "v1");
    customers["cdcApplyChanges"] = json!(
        r#"{"keys": ["customer_id"], "sequence_by": "dmsTimestamp", "scd_type": "2", "except_column_list": ["Op", "dmsTimestamp"]}"#
    );
    customers["appendFlows"] = json!(
        r#"[{"name": "customers_af_flow", "create_streaming_table": false, "source_format": "cloudFiles", "source_details": {"path": "/landing/customers_af"}, "once": true}]"#
    );
    customers["sinks"] = json!(
        r#"[{"name": "customers_kafka", "format": "kafka", "options": "{\"topic\": \"customers\", \"kafka_bootstrap_servers_secrets_scope\": \"kafka\", \"kafka_bootstrap_servers_secrets_key\": \"brokers\"}"}]"#
    );
    customers["dataQualityExpectations"] = json!(
        r#"{"expect_or_drop": {"valid_id": "customer_id IS NOT NULL"}, "expect_or_quarantine": {"valid_email": "email IS NOT NULL"}}"#
    );
    customers["quarantineTargetDetails"] = json!({"database": "bronze", "table": "customers_quarantine"});
    customers["partitionColumns"] = json!(["country", "", "city"]);

    write_table(&dir, "dlt_meta", "bronze_dataflowspec", &[customers])?;
    let conf = conf_file(
        &dir,
        "layer = \"bronze\"\n[bronze]\ndataflowspecTable = \"dlt_meta.bronze_dataflowspec\"\ngroup = \"A1\"\n",
    )?;

    let reader = DataflowSpecReader::new(LocalSpecTable::new(conf.warehouse_path()), conf.clone());
    let specs = reader.get_bronze_dataflow_specs().await?;

    let secrets = StaticSecretStore::new().with_secret("kafka", "brokers", "broker1:9092");
    let plan = PipelinePlanner::new(&secrets).plan_bronze(&specs)?;

    let table = plan.table("bronze.customers").expect("customers table planned");
    match &table.write_mode {
        WriteMode::ApplyChanges { cdc } => {
            assert_eq!(cdc.scd_type, ScdType::Type2);
            assert_eq!(cdc.keys, vec!["customer_id"]);
        }
        other => panic!("expected apply changes, got {:?}", other),
    }
    assert_eq!(table.flows.len(), 2);
    assert_eq!(table.flows[0].kind, FlowKind::Primary);
    assert_eq!(table.flows[0].name, "customers_flow");
    assert_eq!(table.flows[1].kind, FlowKind::Append);
    assert_eq!(table.flows[1].source, "/landing/customers_af");
    assert!(table.flows[1].once);
    assert_eq!(
        table.partition_columns,
        Some(vec!["country".to_string(), "city".to_string()])
    );
    assert_eq!(
        table.quarantine_target.as_deref(),
        Some("bronze.customers_quarantine")
    );
    assert_eq!(table.expectations.as_ref().unwrap().rule_count(), 2);

    let sink = &table.sinks[0];
    assert_eq!(sink.options["kafka.bootstrap.servers"], "***");
    assert_eq!(sink.options["topic"], "customers");
    assert!(!sink.options.contains_key("kafka_bootstrap_servers_secrets_key"));

    assert_eq!(
        plan.merged_targets["bronze.customers"],
        vec!["customers_flow", "customers_af_flow"]
    );
    assert!(plan.fan_out.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_silver_plan_fan_out() -> Result<()> {
    let dir = TempDir::new()?;
    let silver_row = |id: &str, table: &str, country: &str| {
        json!({
            "dataFlowId": id,
            "dataFlowGroup": "A1",
            "sourceFormat": "delta",
            "sourceDetails": {"database": "bronze", "table": "customers"},
            "readerConfigOptions": {},
            "targetFormat": "delta",
            "targetDetails": {"database": "silver", "table": table},
            "tableProperties": {},
            "selectExp": ["customer_id", "email", "country"],
            "whereClause": [format!("country = '{}'", country), "email IS NOT NULL"],
            "partitionColumns": null,
            "cdcApplyChanges": null,
            "version": "v1",
            "createDate": "2024-05-01T10:00:00Z",
            "createdBy": "onboarding",
            "updateDate": "2024-05-01T10:00:00Z",
            "updatedBy": "onboarding"
        })
    };

    write_table(
        &dir,
        "dlt_meta",
        "silver_dataflowspec",
        &[
            silver_row("100", "customers_us", "US"),
            silver_row("101", "customers_fr", "FR"),
        ],
    )?;
    let conf = conf_file(
        &dir,
        "layer = \"silver\"\n[silver]\ndataflowspecTable = \"dlt_meta.silver_dataflowspec\"\ngroup = \"A1\"\n",
    )?;

    let reader = DataflowSpecReader::new(LocalSpecTable::new(conf.warehouse_path()), conf.clone());
    let specs = reader.get_silver_dataflow_specs().await?;
    let secrets = StaticSecretStore::new();
    let plan = PipelinePlanner::new(&secrets).plan_silver(&specs)?;

    assert_eq!(plan.tables.len(), 2);
    assert_eq!(
        plan.fan_out["bronze.customers"],
        vec!["silver.customers_fr", "silver.customers_us"]
    );
    assert!(plan.merged_targets.is_empty());

    let us = plan.table("silver.customers_us").unwrap();
    assert_eq!(
        us.where_clause.as_deref(),
        Some("(country = 'US') AND (email IS NOT NULL)")
    );
    assert_eq!(us.select_exp.as_ref().unwrap().len(), 3);

    let as_json = serde_json::to_value(&plan)?;
    assert_eq!(as_json["layer"], "silver");
    assert_eq!(as_json["tables"][0]["write_mode"]["mode"], "append");
    Ok(())
}
