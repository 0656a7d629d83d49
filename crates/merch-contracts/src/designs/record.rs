use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::tools::ProviderKind;

/// Which path produced a design's image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignSource {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Dryrun,
    Upload,
    /// Legacy rows without a recognisable `source`.
    #[default]
    #[serde(other)]
    Unknown,
}

impl DesignSource {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<ProviderKind> for DesignSource {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OpenAi => Self::OpenAi,
            ProviderKind::Gemini => Self::Gemini,
            ProviderKind::Dryrun => Self::Dryrun,
        }
    }
}

/// One entry of a tool's design store.
///
/// Tool-specific text inputs (`title`, `graphic`, `display_text`, ...) live in
/// `fields` and are flattened into the top-level JSON object; unknown keys on rows
/// written by older tooling land there too and survive a rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignRecord {
    pub id: String,
    #[serde(default)]
    pub tool: String,
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
    #[serde(default)]
    pub bg_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "DesignSource::is_unknown")]
    pub source: DesignSource,
}

impl DesignRecord {
    pub fn new(tool: &str, source: DesignSource) -> Self {
        Self {
            id: new_design_id(),
            tool: tool.to_string(),
            fields: IndexMap::new(),
            bg_color: String::new(),
            aspect: None,
            prompt: None,
            file: None,
            created_at: now_utc_iso(),
            published: false,
            source,
        }
    }

    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Microsecond timestamp in hex, a dot, then eight random hex digits.
///
/// The dot is deliberate: it matches ids already stored by earlier tooling and keeps
/// the form-field sanitization honest.
pub fn new_design_id() -> String {
    let micros = Utc::now().timestamp_micros().max(0);
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{micros:x}.{suffix}")
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::{json, Value};

    use super::{new_design_id, DesignRecord, DesignSource};

    #[test]
    fn ids_are_unique_and_carry_a_dot() {
        let ids: HashSet<String> = (0..500).map(|_| new_design_id()).collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.contains('.')));
    }

    #[test]
    fn tool_fields_flatten_into_the_record_object() -> anyhow::Result<()> {
        let mut record = DesignRecord::new("flyer", DesignSource::Gemini);
        record
            .fields
            .insert("title".to_string(), json!("Summer Jam"));
        record.file = Some("flyer_1_ab.png".to_string());

        let value = serde_json::to_value(&record)?;
        assert_eq!(value["title"], json!("Summer Jam"));
        assert_eq!(value["source"], json!("gemini"));
        assert_eq!(value["published"], json!(false));
        assert!(value.get("fields").is_none());

        let back: DesignRecord = serde_json::from_value(value)?;
        assert_eq!(back, record);
        Ok(())
    }

    #[test]
    fn legacy_rows_load_with_defaults() -> anyhow::Result<()> {
        let row = json!({
            "id": "64f1c2.123",
            "display_text": "Hello",
            "file": "tshirt_old.png",
            "source": "stable-diffusion"
        });
        let record: DesignRecord = serde_json::from_value(row)?;
        assert_eq!(record.source, DesignSource::Unknown);
        assert!(!record.published);
        assert_eq!(record.text_field("display_text"), Some("Hello"));

        let written = serde_json::to_value(&record)?;
        assert!(written.get("source").is_none());
        assert_eq!(written["display_text"], Value::String("Hello".to_string()));
        Ok(())
    }
}
