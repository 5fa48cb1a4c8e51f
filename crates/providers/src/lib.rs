//! Model backends for turnstream.
//!
//! All backends implement [`turnstream_core::ModelBackend`]. Only the
//! OpenAI-compatible protocol is built in; it covers most hosted and local
//! model servers.

pub mod openai_compat;

use std::sync::Arc;

use turnstream_config::ModelConfig;
use turnstream_core::{ModelBackend, ProviderError};

pub use openai_compat::OpenAiCompatBackend;

/// Build the backend named by `config.provider`.
pub fn build_backend(config: &ModelConfig) -> Result<Arc<dyn ModelBackend>, ProviderError> {
    match config.provider.as_str() {
        "openai_compat" => Ok(Arc::new(OpenAiCompatBackend::from_config(config)?)),
        other => Err(ProviderError::NotConfigured(format!(
            "unknown model provider '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_default_backend() {
        let backend = build_backend(&ModelConfig::default()).unwrap();
        assert_eq!(backend.name(), "openai_compat");
    }
}
