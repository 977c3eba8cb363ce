pub mod metadata_parser;
pub mod onboarding_template;
pub mod plan;
pub mod spec_reader;

pub use crate::domain::metadata::{AppendFlow, CdcApplyChanges, DataQualityExpectations, Sink};
pub use crate::domain::model::{BronzeDataflowSpec, Layer, SilverDataflowSpec, SpecRow};
pub use crate::domain::ports::{SecretStore, SpecTable};
pub use crate::utils::error::Result;
