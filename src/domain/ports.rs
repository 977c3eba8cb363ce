use crate::domain::model::SpecRow;
use crate::utils::error::Result;

/// dataflow spec 表的讀取來源
pub trait SpecTable: Send + Sync {
    fn read_rows(&self, table: &str) -> impl std::future::Future<Output = Result<Vec<SpecRow>>> + Send;
}

/// sink 設定中引用的 secret 由此解析
pub trait SecretStore: Send + Sync {
    fn get(&self, scope: &str, key: &str) -> Result<String>;
}
