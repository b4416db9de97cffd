//! OpenAI client configuration.

use crate::config::PlannerSettings;
use crate::error::Result;
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Create an OpenAI-compatible client from planner settings.
///
/// The API key comes from `OPENAI_API_KEY`; `api_base` redirects requests to
/// any compatible endpoint.
pub fn create_client(settings: &PlannerSettings) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?;

    let mut config = OpenAIConfig::default();
    if let Some(base) = &settings.api_base {
        config = config.with_api_base(base.trim_end_matches('/'));
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}
