// Adapters layer: concrete implementations of the domain ports (local spec table, secret stores).

pub mod local_table;
pub mod secrets;

pub use local_table::LocalSpecTable;
pub use secrets::{EnvSecretStore, StaticSecretStore};
