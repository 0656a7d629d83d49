use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use merch_contracts::config::StudioConfig;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{
    http_client, response_json_or_error, transport_error, truncate_text, GenerateRequest,
    GeneratedImage, ImageProvider, ProviderError,
};

const PROVIDER: &str = "Gemini";

pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn from_config(config: &StudioConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .gemini_key()
            .ok_or(ProviderError::MissingApiKey { provider: PROVIDER })?;
        Ok(Self {
            api_base: config.gemini_api_base.trim().trim_end_matches('/').to_string(),
            api_key,
            model: config.gemini_model.clone(),
            http: http_client(PROVIDER, config.request_timeout())?,
        })
    }

    fn endpoint(&self) -> String {
        endpoint_for_model(&self.api_base, &self.model)
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, model = %self.model, "gemini generate request");
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&build_payload(request))
            .send()
            .map_err(|err| transport_error(PROVIDER, err))?;
        let response_payload = response_json_or_error(PROVIDER, response)?;
        extract_image(&response_payload)
    }
}

fn endpoint_for_model(api_base: &str, model: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{api_base}/{model_path}:generateContent")
}

fn build_payload(request: &GenerateRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    if let Some(reference) = request.reference.as_ref() {
        parts.push(json!({
            "inline_data": {
                "mime_type": reference.mime_type,
                "data": BASE64.encode(&reference.bytes),
            }
        }));
    }
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": { "aspectRatio": request.aspect.ratio() },
        },
    })
}

/// First part carrying inline image data, in either key casing. When no image
/// came back, any text the model returned is kept as the error detail.
fn extract_image(response_payload: &Value) -> Result<GeneratedImage, ProviderError> {
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut texts = Vec::new();

    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                let text = text.trim();
                if !text.is_empty() {
                    texts.push(text.to_string());
                }
            }
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64
                .decode(data.as_bytes())
                .map_err(|err| ProviderError::Decode {
                    provider: PROVIDER,
                    message: format!("image base64 decode failed ({err})"),
                })?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            return Ok(GeneratedImage { bytes, mime_type });
        }
    }

    let detail = if texts.is_empty() {
        response_payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
            .map(|reason| format!("blocked ({reason})"))
    } else {
        Some(truncate_text(&texts.join(" "), 512))
    };
    Err(ProviderError::EmptyResponse {
        provider: PROVIDER,
        detail,
    })
}
