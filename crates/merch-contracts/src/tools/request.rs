use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::aspect::AspectRatio;
use super::descriptor::{PromptPart, ToolDescriptor};
use crate::errors::{StudioError, StudioResult};

/// Raw text inputs of a submitted creator form, in submission order.
pub type FormFields = IndexMap<String, String>;

pub const REFERENCE_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// Remote (or offline) image generator selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Dryrun,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            "dryrun" => Some(Self::Dryrun),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Dryrun => "dryrun",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
            Self::Dryrun => "Dryrun",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

/// A validated creator form, ready for prompt building and generation.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignRequest {
    pub tool: &'static ToolDescriptor,
    /// Non-empty values of the tool's declared fields, in declaration order.
    pub fields: IndexMap<String, String>,
    pub bg_color: Option<String>,
    pub aspect: AspectRatio,
    pub transparent: bool,
    /// `None` means "use the configured default provider".
    pub provider: Option<ProviderKind>,
    pub reference: Option<ReferenceImage>,
}

impl DesignRequest {
    /// Validates a creator form against the tool's field list. Fails on the first
    /// missing required field, before anything leaves the process.
    pub fn from_form(
        tool: &'static ToolDescriptor,
        form: &FormFields,
        reference: Option<ReferenceImage>,
    ) -> StudioResult<Self> {
        if !tool.generative {
            return Err(StudioError::validation(format!(
                "{} does not generate designs.",
                tool.label
            )));
        }

        let mut fields = IndexMap::new();
        for spec in tool.fields {
            let value = form_value(form, spec.name);
            match value {
                Some(value) => {
                    fields.insert(spec.name.to_string(), value.to_string());
                }
                None if spec.required => {
                    return Err(StudioError::validation(format!(
                        "{} is required.",
                        spec.label
                    )));
                }
                None => {}
            }
        }

        let bg_color = form_value(form, "bg_color")
            .map(normalize_hex_color)
            .transpose()?;
        let aspect = AspectRatio::from_form(form_value(form, "aspect"), tool.default_aspect);
        let transparent = form_value(form, "transparent")
            .map(is_checked)
            .unwrap_or(false);
        let provider = form_value(form, "provider")
            .map(|raw| {
                ProviderKind::parse(raw).ok_or_else(|| {
                    StudioError::validation(format!("Unknown image provider '{raw}'."))
                })
            })
            .transpose()?;

        if let Some(reference) = reference.as_ref() {
            if reference.bytes.is_empty() {
                return Err(StudioError::validation("Reference image is empty."));
            }
            if !REFERENCE_MIME_TYPES.contains(&reference.mime_type.as_str()) {
                return Err(StudioError::validation(
                    "Reference image must be a PNG, JPEG or WebP file.",
                ));
            }
        }

        Ok(Self {
            tool,
            fields,
            bg_color,
            aspect,
            transparent,
            provider,
            reference,
        })
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Background mode forwarded to providers that support it.
    pub fn background_mode(&self) -> Option<&'static str> {
        self.transparent.then_some("transparent")
    }

    pub fn prompt(&self) -> String {
        build_prompt(self)
    }
}

/// Renders the tool's template with the request's values. Values are inserted
/// verbatim; placeholders inside values are not expanded again.
pub fn build_prompt(request: &DesignRequest) -> String {
    let mut pieces = Vec::new();
    for part in request.tool.template {
        match part {
            PromptPart::Text(text) => pieces.push(interpolate(text, request)),
            PromptPart::IfSet(field, text) => {
                if request.fields.contains_key(*field) {
                    pieces.push(interpolate(text, request));
                }
            }
            PromptPart::Background => {
                if let Some(clause) = background_clause(request) {
                    pieces.push(clause);
                }
            }
        }
    }
    if request.reference.is_some() {
        pieces.push("Use the attached reference image as visual guidance.".to_string());
    }
    pieces.join(" ")
}

fn background_clause(request: &DesignRequest) -> Option<String> {
    if request.transparent {
        return Some("Use a transparent background with no backdrop.".to_string());
    }
    request
        .bg_color
        .as_deref()
        .map(|color| format!("Use a solid {color} background."))
}

fn interpolate(template: &str, request: &DesignRequest) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        let value = match key {
            "ratio" => Some(request.aspect.ratio()),
            "bg" => request.bg_color.as_deref(),
            field => request.field(field),
        };
        match value {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn form_value<'a>(form: &'a FormFields, name: &str) -> Option<&'a str> {
    form.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn is_checked(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "on" | "true" | "yes" | "transparent"
    )
}

/// Accepts `#rgb`, `#rrggbb` and the same without `#`; always returns the `#` form.
fn normalize_hex_color(raw: &str) -> StudioResult<String> {
    let digits = raw.trim().trim_start_matches('#');
    let valid = matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(StudioError::validation(format!(
            "Background color '{raw}' is not a hex color like #1a2b3c."
        )));
    }
    Ok(format!("#{}", digits.to_ascii_lowercase()))
}
