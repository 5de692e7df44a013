//! Concrete provider implementations and the provider factory.
//!
//! Each backend adapts the provider-agnostic message types to one vendor's
//! wire format. OpenAI and OpenRouter share the OpenAI-compatible chat
//! completion shape; Anthropic uses its own messages API with a top-level
//! system field and base64 image blocks.

pub mod anthropic;
pub mod openai;
pub mod openrouter;

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::config::PixieConfig;
use super::provider::Provider;
use crate::error::AgentError;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;

/// Creates a [`Provider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default) - OpenAI-compatible APIs
/// - `"anthropic"` - the Anthropic messages API
/// - `"openrouter"` - OpenRouter's OpenAI-compatible API
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &PixieConfig) -> Result<Arc<dyn Provider>, AgentError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(
            &config.api_key,
            config.base_url.as_deref(),
        ))),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(
            &config.api_key,
            config.base_url.as_deref(),
        ))),
        "openrouter" => Ok(Arc::new(OpenRouterProvider::new(&config.api_key))),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}

/// MIME type for an image path, inferred from its extension.
/// Page rasterization emits JPEG, so that is the default.
fn media_type(path: &str) -> &'static str {
    match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Reads an image file and returns its base64 encoding with its MIME type.
async fn encode_image(path: &str) -> Result<(String, &'static str), AgentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AgentError::ImageRead {
            path: path.to_string(),
            message: e.to_string(),
        })?;
    Ok((STANDARD.encode(bytes), media_type(path)))
}

/// Reads an image file and returns it as a `data:` URL.
async fn image_data_url(path: &str) -> Result<String, AgentError> {
    let (encoded, media_type) = encode_image(path).await?;
    Ok(format!("data:{media_type};base64,{encoded}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_create_provider_by_name() {
        for (name, expected) in [
            ("openai", "openai"),
            ("anthropic", "anthropic"),
            ("openrouter", "openrouter"),
        ] {
            let config = PixieConfig::builder()
                .api_key("test")
                .provider(name)
                .build()
                .unwrap_or_else(|_| unreachable!());
            let provider = create_provider(&config);
            assert_eq!(
                provider.map(|p| p.name()).unwrap_or("error"),
                expected,
                "provider {name}"
            );
        }
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = PixieConfig::builder()
            .api_key("test")
            .provider("mystery")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let result = create_provider(&config);
        assert!(matches!(
            result,
            Err(AgentError::UnsupportedProvider { name }) if name == "mystery"
        ));
    }

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(media_type("/a/page.jpg"), "image/jpeg");
        assert_eq!(media_type("/a/page.PNG"), "image/png");
        assert_eq!(media_type("/a/page.webp"), "image/webp");
        assert_eq!(media_type("/a/page"), "image/jpeg");
    }

    #[tokio::test]
    async fn test_encode_image_roundtrip() {
        let mut file = tempfile::Builder::new()
            .suffix(".jpg")
            .tempfile()
            .unwrap_or_else(|_| unreachable!());
        file.write_all(b"fake image bytes")
            .unwrap_or_else(|_| unreachable!());
        let path = file.path().to_string_lossy().to_string();

        let url = image_data_url(&path)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let encoded = url.trim_start_matches("data:image/jpeg;base64,");
        let decoded = STANDARD.decode(encoded).unwrap_or_default();
        assert_eq!(decoded, b"fake image bytes");
    }

    #[tokio::test]
    async fn test_encode_missing_image_errors() {
        let result = encode_image("/nonexistent/page.jpg").await;
        assert!(matches!(result, Err(AgentError::ImageRead { .. })));
    }
}
