use anyhow::Result;
use strum_macros::EnumIter;

use super::{
    base::Provider, configs::ProviderConfig, databricks::DatabricksProvider,
    openai::OpenAiProvider,
};

#[derive(EnumIter, Debug)]
pub enum ProviderType {
    Databricks,
    OpenAi,
}

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider + Send + Sync>> {
    match config {
        ProviderConfig::Databricks(databricks_config) => {
            Ok(Box::new(DatabricksProvider::new(databricks_config)?))
        }
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
    }
}
