//! Image generation back ends behind one call contract.

mod dryrun;
mod gemini;
mod openai;

use std::time::Duration;

use merch_contracts::config::StudioConfig;
use merch_contracts::errors::StudioError;
use merch_contracts::tools::{AspectRatio, ProviderKind, ReferenceImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use thiserror::Error;

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub aspect: AspectRatio,
    /// `Some("transparent")` when the form asked for a transparent background.
    pub background: Option<&'static str>,
    pub reference: Option<ReferenceImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API key is not configured. Add it on the settings page.")]
    MissingApiKey { provider: &'static str },
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },
    /// `message` is the provider's own text when it sent one.
    #[error("{message}")]
    Status {
        provider: &'static str,
        code: u16,
        message: String,
    },
    #[error("{provider} returned no image data{}", detail_suffix(.detail))]
    EmptyResponse {
        provider: &'static str,
        detail: Option<String>,
    },
    #[error("{provider} response could not be decoded: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
}

impl From<ProviderError> for StudioError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingApiKey { .. } => StudioError::configuration(err.to_string()),
            _ => StudioError::provider(err.to_string()),
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|detail| format!(": {detail}"))
        .unwrap_or_default()
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError>;
}

/// Builds the provider for a request from the configuration loaded for it.
/// Implementations check credentials before creating any HTTP client.
pub trait ProviderFactory: Send + Sync {
    fn build(
        &self,
        kind: ProviderKind,
        config: &StudioConfig,
    ) -> Result<Box<dyn ImageProvider>, ProviderError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProviders;

impl ProviderFactory for DefaultProviders {
    fn build(
        &self,
        kind: ProviderKind,
        config: &StudioConfig,
    ) -> Result<Box<dyn ImageProvider>, ProviderError> {
        Ok(match kind {
            ProviderKind::OpenAi => Box::new(OpenAiProvider::from_config(config)?),
            ProviderKind::Gemini => Box::new(GeminiProvider::from_config(config)?),
            ProviderKind::Dryrun => Box::new(DryrunProvider),
        })
    }
}

fn http_client(provider: &'static str, timeout: Duration) -> Result<HttpClient, ProviderError> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| transport_error(provider, err))
}

fn transport_error(provider: &'static str, err: reqwest::Error) -> ProviderError {
    let message = if err.is_timeout() {
        "timed out waiting for the provider".to_string()
    } else {
        // The URL can carry the Gemini key as a query parameter.
        error_chain_text(&err.without_url(), 512)
    };
    ProviderError::Transport { provider, message }
}

/// Reads the body, turning non-2xx statuses into the provider's own message.
fn response_json_or_error(
    provider: &'static str,
    response: HttpResponse,
) -> Result<Value, ProviderError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| transport_error(provider, err))?;
    if !status.is_success() {
        let message = provider_error_message(&body).unwrap_or_else(|| {
            format!(
                "{provider} request failed ({code}): {}",
                truncate_text(body.trim(), 512)
            )
        });
        return Err(ProviderError::Status {
            provider,
            code,
            message,
        });
    }
    serde_json::from_str(&body).map_err(|err| ProviderError::Decode {
        provider,
        message: format!("invalid JSON payload ({err})"),
    })
}

/// `{"error": {"message": ...}}`, `{"error": "..."}` or `{"message": ...}`.
fn provider_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let error = parsed.get("error");
    error
        .and_then(|error| error.get("message"))
        .or_else(|| error.filter(|error| error.is_string()))
        .or_else(|| parsed.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

fn error_chain_text(err: &(dyn std::error::Error + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty()
            && !parts
                .last()
                .map(|existing| existing == trimmed)
                .unwrap_or(false)
        {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    use merch_contracts::config::StudioConfig;
    use merch_contracts::errors::StudioError;
    use merch_contracts::tools::{AspectRatio, ProviderKind};

    use super::{
        provider_error_message, DefaultProviders, GenerateRequest, ProviderError, ProviderFactory,
    };

    /// Answers a single request with a canned response and hands back the raw
    /// request head it received.
    fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> anyhow::Result<(String, JoinHandle<std::io::Result<String>>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base = format!("http://{}", listener.local_addr()?);
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept()?;
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            let head_len = loop {
                let read = stream.read(&mut chunk)?;
                if read == 0 {
                    break request.len();
                }
                request.extend_from_slice(&chunk[..read]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&request[..head_len]).to_string();
            let body_len = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while request.len() < head_len + body_len {
                let read = stream.read(&mut chunk)?;
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
            }
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )?;
            stream.flush()?;
            Ok(head)
        });
        Ok((base, handle))
    }

    fn generate(kind: ProviderKind, config: &StudioConfig) -> Result<(), ProviderError> {
        let provider = DefaultProviders.build(kind, config)?;
        provider
            .generate(&GenerateRequest {
                prompt: "Flyer design for Summer Jam".to_string(),
                aspect: AspectRatio::Square,
                background: None,
                reference: None,
            })
            .map(|_| ())
    }

    fn joined(handle: JoinHandle<std::io::Result<String>>) -> anyhow::Result<String> {
        Ok(handle
            .join()
            .map_err(|_| anyhow::anyhow!("canned server panicked"))??)
    }

    #[test]
    fn openai_error_status_keeps_the_provider_message() -> anyhow::Result<()> {
        let (base, server) = serve_once(
            "400 Bad Request",
            "application/json",
            r#"{"error":{"message":"Your request was rejected by the safety system.","type":"image_generation_user_error"}}"#,
        )?;
        let config = StudioConfig {
            openai_api_key: "sk-test".to_string(),
            openai_api_base: format!("{base}/v1"),
            ..StudioConfig::default()
        };

        let err = generate(ProviderKind::OpenAi, &config).err();
        assert!(matches!(err, Some(ProviderError::Status { code: 400, .. })), "{err:?}");
        let err: Option<StudioError> = err.map(Into::into);
        assert_eq!(err.as_ref().map(StudioError::kind), Some("provider"));
        assert_eq!(
            err.as_ref().map(StudioError::message),
            Some("Your request was rejected by the safety system.")
        );

        let head = joined(server)?;
        assert!(head.starts_with("POST /v1/images/generations "), "{head}");
        assert!(head.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        Ok(())
    }

    #[test]
    fn gemini_non_json_failure_reports_status_and_body() -> anyhow::Result<()> {
        let (base, server) = serve_once(
            "503 Service Unavailable",
            "text/html",
            "<html>upstream overloaded</html>",
        )?;
        let config = StudioConfig {
            gemini_api_key: "AIza-test-key".to_string(),
            gemini_api_base: base,
            ..StudioConfig::default()
        };

        let err: Option<StudioError> = generate(ProviderKind::Gemini, &config)
            .err()
            .map(Into::into);
        assert_eq!(err.as_ref().map(StudioError::kind), Some("provider"));
        assert_eq!(
            err.as_ref().map(StudioError::message),
            Some("Gemini request failed (503): <html>upstream overloaded</html>")
        );

        let head = joined(server)?;
        assert!(
            head.starts_with("POST /models/gemini-2.5-flash-image-preview:generateContent?key=AIza-test-key "),
            "{head}"
        );
        Ok(())
    }

    #[test]
    fn silent_provider_times_out_as_transport_error() -> anyhow::Result<()> {
        // Connections complete in the backlog but nothing ever answers.
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let config = StudioConfig {
            openai_api_key: "sk-test".to_string(),
            openai_api_base: format!("http://{}/v1", listener.local_addr()?),
            request_timeout_secs: 1,
            ..StudioConfig::default()
        };

        let started = Instant::now();
        let err = generate(ProviderKind::OpenAi, &config).err();
        assert!(started.elapsed() < Duration::from_secs(30));
        assert!(matches!(err, Some(ProviderError::Transport { .. })), "{err:?}");
        let err: Option<StudioError> = err.map(Into::into);
        assert_eq!(err.as_ref().map(StudioError::kind), Some("provider"));
        let message = err.as_ref().map(StudioError::message).unwrap_or_default();
        assert!(message.starts_with("OpenAI request failed: "), "{message}");
        assert!(message.contains("timed out"), "{message}");
        drop(listener);
        Ok(())
    }

    #[test]
    fn gemini_transport_errors_never_echo_the_key() -> anyhow::Result<()> {
        let addr = TcpListener::bind("127.0.0.1:0")?.local_addr()?;
        let config = StudioConfig {
            gemini_api_key: "AIza-secret-key".to_string(),
            gemini_api_base: format!("http://{addr}"),
            ..StudioConfig::default()
        };

        let err = generate(ProviderKind::Gemini, &config).err();
        assert!(matches!(err, Some(ProviderError::Transport { .. })), "{err:?}");
        let message = err.map(|err| err.to_string()).unwrap_or_default();
        assert!(message.starts_with("Gemini request failed: "), "{message}");
        assert!(!message.contains("AIza-secret-key"), "{message}");
        Ok(())
    }

    #[test]
    fn provider_messages_are_taken_verbatim() {
        assert_eq!(
            provider_error_message(r#"{"error":{"message":"Invalid size '12x12'.","type":"invalid_request_error"}}"#)
                .as_deref(),
            Some("Invalid size '12x12'.")
        );
        assert_eq!(
            provider_error_message(r#"{"error":"quota exceeded"}"#).as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(provider_error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn missing_key_maps_to_configuration_error() {
        let err: StudioError = ProviderError::MissingApiKey { provider: "Gemini" }.into();
        assert_eq!(err.kind(), "configuration");
        assert_eq!(
            err.message(),
            "Gemini API key is not configured. Add it on the settings page."
        );

        let err: StudioError = ProviderError::EmptyResponse {
            provider: "Gemini",
            detail: Some("I can't draw that.".to_string()),
        }
        .into();
        assert_eq!(err.kind(), "provider");
        assert_eq!(err.message(), "Gemini returned no image data: I can't draw that.");
    }

    #[test]
    fn dryrun_needs_no_credentials() {
        let built = DefaultProviders.build(ProviderKind::Dryrun, &StudioConfig::default());
        assert_eq!(built.ok().map(|provider| provider.name().to_string()), Some("dryrun".to_string()));
    }
}
