use serde::{Deserialize, Serialize};

/// Output framing offered by every creator form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    #[default]
    Portrait,
    Landscape,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectSpec {
    pub aspect: AspectRatio,
    pub name: &'static str,
    /// Ratio as written into prompts and the Gemini `imageConfig`.
    pub ratio: &'static str,
    /// Pixel size string sent to OpenAI.
    pub size: &'static str,
    pub width: u32,
    pub height: u32,
}

static ASPECT_TABLE: [AspectSpec; 3] = [
    AspectSpec {
        aspect: AspectRatio::Portrait,
        name: "portrait",
        ratio: "2:3",
        size: "1024x1536",
        width: 1024,
        height: 1536,
    },
    AspectSpec {
        aspect: AspectRatio::Landscape,
        name: "landscape",
        ratio: "3:2",
        size: "1536x1024",
        width: 1536,
        height: 1024,
    },
    AspectSpec {
        aspect: AspectRatio::Square,
        name: "square",
        ratio: "1:1",
        size: "1024x1024",
        width: 1024,
        height: 1024,
    },
];

impl AspectRatio {
    /// Unrecognised values fall back to portrait.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        ASPECT_TABLE
            .iter()
            .find(|spec| spec.name == normalized)
            .map(|spec| spec.aspect)
            .unwrap_or(AspectRatio::Portrait)
    }

    /// A missing or blank form value means the tool's default framing.
    pub fn from_form(raw: Option<&str>, tool_default: AspectRatio) -> Self {
        match raw.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => Self::parse(value),
            None => tool_default,
        }
    }

    pub fn spec(self) -> &'static AspectSpec {
        ASPECT_TABLE
            .iter()
            .find(|spec| spec.aspect == self)
            .unwrap_or(&ASPECT_TABLE[0])
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    pub fn ratio(self) -> &'static str {
        self.spec().ratio
    }

    pub fn size(self) -> &'static str {
        self.spec().size
    }
}
