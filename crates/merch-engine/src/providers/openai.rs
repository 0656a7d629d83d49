use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use merch_contracts::config::StudioConfig;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use super::{
    http_client, response_json_or_error, transport_error, truncate_text, GenerateRequest,
    GeneratedImage, ImageProvider, ProviderError,
};

const PROVIDER: &str = "OpenAI";

pub struct OpenAiProvider {
    api_base: String,
    api_key: String,
    model: String,
    quality: String,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn from_config(config: &StudioConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .openai_key()
            .ok_or(ProviderError::MissingApiKey { provider: PROVIDER })?;
        Ok(Self {
            api_base: config.openai_api_base.trim().trim_end_matches('/').to_string(),
            api_key,
            model: config.openai_model.trim().to_string(),
            quality: config.image_quality.trim().to_string(),
            http: http_client(PROVIDER, config.request_timeout())?,
        })
    }

    fn generate_image(&self, request: &GenerateRequest) -> Result<Value, ProviderError> {
        let endpoint = format!("{}/images/generations", self.api_base);
        let payload = generation_payload(&self.model, &self.quality, request);
        tracing::debug!(%endpoint, model = %self.model, "openai generation request");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&Value::Object(payload))
            .send()
            .map_err(|err| transport_error(PROVIDER, err))?;
        response_json_or_error(PROVIDER, response)
    }

    fn edit_image(&self, request: &GenerateRequest) -> Result<Value, ProviderError> {
        let Some(reference) = request.reference.as_ref() else {
            return self.generate_image(request);
        };
        let endpoint = format!("{}/images/edits", self.api_base);
        let mut form = MultipartForm::new();
        for (key, value) in generation_payload(&self.model, &self.quality, request) {
            let text = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            form = form.text(key, text);
        }
        let file_name = reference
            .file_name
            .clone()
            .unwrap_or_else(|| format!("reference.{}", extension_for(&reference.mime_type)));
        let part = MultipartPart::bytes(reference.bytes.clone())
            .file_name(file_name)
            .mime_str(&reference.mime_type)
            .map_err(|err| transport_error(PROVIDER, err))?;
        form = form.part("image", part);

        tracing::debug!(%endpoint, model = %self.model, "openai edit request");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|err| transport_error(PROVIDER, err))?;
        response_json_or_error(PROVIDER, response)
    }

    fn download_image(&self, url: &str) -> Result<GeneratedImage, ProviderError> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|err| transport_error(PROVIDER, err))?;
        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                code,
                message: format!(
                    "OpenAI image download failed ({code}): {}",
                    truncate_text(body.trim(), 512)
                ),
            });
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response
            .bytes()
            .map_err(|err| transport_error(PROVIDER, err))?
            .to_vec();
        Ok(GeneratedImage { bytes, mime_type })
    }
}

impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
        let response_payload = if request.reference.is_some() {
            self.edit_image(request)?
        } else {
            self.generate_image(request)?
        };
        match extract_image(&response_payload)? {
            OpenAiImage::Inline(image) => Ok(image),
            OpenAiImage::Remote(url) => self.download_image(&url),
        }
    }
}

#[derive(Debug, PartialEq)]
enum OpenAiImage {
    Inline(GeneratedImage),
    Remote(String),
}

fn is_gpt_image_model(model: &str) -> bool {
    model.trim().to_ascii_lowercase().starts_with("gpt-image")
}

/// Body for `/images/generations`; the edit endpoint sends the same keys as
/// multipart text fields.
fn generation_payload(model: &str, quality: &str, request: &GenerateRequest) -> Map<String, Value> {
    let mut payload = json!({
        "model": model,
        "prompt": request.prompt,
        "n": 1,
        "size": request.aspect.size(),
    })
    .as_object()
    .cloned()
    .unwrap_or_default();
    if is_gpt_image_model(model) {
        if !quality.is_empty() {
            payload.insert("quality".to_string(), Value::String(quality.to_string()));
        }
        payload.insert("output_format".to_string(), Value::String("png".to_string()));
        if let Some(background) = request.background {
            payload.insert(
                "background".to_string(),
                Value::String(background.to_string()),
            );
        }
    } else {
        payload.insert(
            "response_format".to_string(),
            Value::String("b64_json".to_string()),
        );
    }
    payload
}

fn extract_image(response_payload: &Value) -> Result<OpenAiImage, ProviderError> {
    let rows = response_payload
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for row in rows {
        if let Some(b64) = row.get("b64_json").and_then(Value::as_str) {
            let bytes = BASE64
                .decode(b64.trim().as_bytes())
                .map_err(|err| ProviderError::Decode {
                    provider: PROVIDER,
                    message: format!("image base64 decode failed ({err})"),
                })?;
            if bytes.is_empty() {
                continue;
            }
            return Ok(OpenAiImage::Inline(GeneratedImage {
                bytes,
                mime_type: "image/png".to_string(),
            }));
        }
        if let Some(url) = row.get("url").and_then(Value::as_str) {
            return Ok(OpenAiImage::Remote(url.to_string()));
        }
    }
    Err(ProviderError::EmptyResponse {
        provider: PROVIDER,
        detail: None,
    })
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use merch_contracts::config::StudioConfig;
    use merch_contracts::tools::AspectRatio;
    use serde_json::{json, Value};

    use super::{extract_image, generation_payload, OpenAiImage, OpenAiProvider};
    use crate::providers::{GenerateRequest, GeneratedImage, ProviderError};

    fn request(background: Option<&'static str>) -> GenerateRequest {
        GenerateRequest {
            prompt: "Logo design, 1:1 aspect ratio.".to_string(),
            aspect: AspectRatio::Landscape,
            background,
            reference: None,
        }
    }

    #[test]
    fn gpt_image_payload_carries_size_quality_and_background() {
        let payload = generation_payload("gpt-image-1", "high", &request(Some("transparent")));
        assert_eq!(payload.get("size"), Some(&json!("1536x1024")));
        assert_eq!(payload.get("quality"), Some(&json!("high")));
        assert_eq!(payload.get("output_format"), Some(&json!("png")));
        assert_eq!(payload.get("background"), Some(&json!("transparent")));
        assert_eq!(payload.get("n"), Some(&json!(1)));

        let opaque = generation_payload("gpt-image-1", "high", &request(None));
        assert!(opaque.get("background").is_none());
    }

    #[test]
    fn dall_e_payload_asks_for_base64() {
        let payload = generation_payload("dall-e-3", "high", &request(Some("transparent")));
        assert_eq!(payload.get("response_format"), Some(&json!("b64_json")));
        assert!(payload.get("quality").is_none());
        assert!(payload.get("background").is_none());
    }

    #[test]
    fn extracts_base64_or_url() -> anyhow::Result<()> {
        let inline = json!({"data": [{"b64_json": BASE64.encode(b"png-bytes")}]});
        assert_eq!(
            extract_image(&inline)?,
            OpenAiImage::Inline(GeneratedImage {
                bytes: b"png-bytes".to_vec(),
                mime_type: "image/png".to_string(),
            })
        );

        let remote = json!({"data": [{"url": "https://cdn.example.com/a.png"}]});
        assert_eq!(
            extract_image(&remote)?,
            OpenAiImage::Remote("https://cdn.example.com/a.png".to_string())
        );
        Ok(())
    }

    #[test]
    fn missing_or_broken_payload_is_an_error() {
        assert!(matches!(
            extract_image(&json!({"data": []})),
            Err(ProviderError::EmptyResponse { .. })
        ));
        assert!(matches!(
            extract_image(&Value::Null),
            Err(ProviderError::EmptyResponse { .. })
        ));
        assert!(matches!(
            extract_image(&json!({"data": [{"b64_json": "%%%"}]})),
            Err(ProviderError::Decode { .. })
        ));
    }

    #[test]
    fn missing_key_fails_before_any_client_exists() {
        std::env::remove_var("OPENAI_API_KEY");
        let err = OpenAiProvider::from_config(&StudioConfig::default()).err();
        assert!(matches!(err, Some(ProviderError::MissingApiKey { provider: "OpenAI" })));
    }
}
