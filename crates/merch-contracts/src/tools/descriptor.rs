use serde::Serialize;

use super::aspect::AspectRatio;

/// One user-facing input of a creator form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub multiline: bool,
}

/// A piece of a prompt template. `{ratio}`, `{bg}` and field names inside the text
/// are replaced with request values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPart {
    Text(&'static str),
    /// Emitted only when the named field has a value.
    IfSet(&'static str, &'static str),
    /// Transparent / solid colour clause; nothing when neither was requested.
    Background,
}

/// Everything that distinguishes one design tool from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub asset_prefix: &'static str,
    pub fields: &'static [FieldSpec],
    #[serde(skip)]
    pub template: &'static [PromptPart],
    pub default_aspect: AspectRatio,
    pub generative: bool,
}

impl ToolDescriptor {
    pub fn store_file(&self) -> String {
        format!("{}_designs.json", self.id)
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }
}

const fn required(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required: true,
        multiline: false,
    }
}

const fn optional(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required: false,
        multiline: false,
    }
}

const fn notes(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required: false,
        multiline: true,
    }
}

use PromptPart::{Background, IfSet, Text};

static TOOLS: [ToolDescriptor; 13] = [
    ToolDescriptor {
        id: "tshirt",
        label: "T-Shirt",
        asset_prefix: "tshirt",
        fields: &[
            optional("display_text", "Text on the shirt"),
            required("graphic", "Graphic description"),
            optional("style", "Art style"),
        ],
        template: &[
            Text("T-shirt print design, {ratio} aspect ratio, centered artwork suitable for screen printing."),
            Background,
            IfSet("display_text", "Include the text \"{display_text}\" rendered clearly and spelled exactly."),
            Text("Graphic: {graphic}."),
            IfSet("style", "Style: {style}."),
            Text("Only the printable artwork: no shirt, no model, no mockup."),
        ],
        default_aspect: AspectRatio::Portrait,
        generative: true,
    },
    ToolDescriptor {
        id: "logo",
        label: "Logo",
        asset_prefix: "logo",
        fields: &[
            required("name", "Brand name"),
            required("graphic", "Icon or symbol"),
            optional("tagline", "Tagline"),
            optional("style", "Style"),
        ],
        template: &[
            Text("Logo design, {ratio} aspect ratio. Brand name: \"{name}\"."),
            IfSet("tagline", "Tagline: \"{tagline}\"."),
            Text("Symbol: {graphic}."),
            IfSet("style", "Style: {style}."),
            Background,
            Text("Clean vector look with flat colors and crisp edges, no mockup."),
        ],
        default_aspect: AspectRatio::Square,
        generative: true,
    },
    ToolDescriptor {
        id: "poster",
        label: "Poster",
        asset_prefix: "poster",
        fields: &[
            required("title", "Poster title"),
            required("graphic", "Main visual"),
            notes("details", "Supporting text"),
            optional("style", "Style"),
        ],
        template: &[
            Text("Poster design, {ratio} aspect ratio."),
            Background,
            Text("Headline: \"{title}\"."),
            IfSet("details", "Supporting text: \"{details}\"."),
            Text("Main visual: {graphic}."),
            IfSet("style", "Style: {style}."),
            Text("Bold, legible typography with a clear visual hierarchy."),
        ],
        default_aspect: AspectRatio::Portrait,
        generative: true,
    },
    ToolDescriptor {
        id: "flyer",
        label: "Flyer",
        asset_prefix: "flyer",
        fields: &[
            required("title", "Event name"),
            notes("details", "Event details"),
            required("graphic", "Graphic description"),
        ],
        template: &[
            Text("Flyer design, {ratio} aspect ratio."),
            Background,
            Text("Event name: \"{title}\"."),
            IfSet("details", "Details: \"{details}\"."),
            Text("Graphic: {graphic}."),
            Text("Make every word readable and correctly spelled."),
        ],
        default_aspect: AspectRatio::Portrait,
        generative: true,
    },
    ToolDescriptor {
        id: "social",
        label: "Social Post",
        asset_prefix: "social",
        fields: &[
            required("title", "Headline"),
            required("subject", "Visual subject"),
            optional("platform", "Platform"),
            notes("details", "Extra copy"),
        ],
        template: &[
            Text("Social media post graphic, {ratio} aspect ratio."),
            IfSet("platform", "Made for {platform}."),
            Background,
            Text("Headline: \"{title}\"."),
            IfSet("details", "Extra copy: \"{details}\"."),
            Text("Visual: {subject}."),
            Text("Eye-catching and uncluttered at thumbnail size."),
        ],
        default_aspect: AspectRatio::Square,
        generative: true,
    },
    ToolDescriptor {
        id: "photo",
        label: "Product Photo",
        asset_prefix: "photo",
        fields: &[
            required("subject", "Subject"),
            optional("setting", "Setting"),
            optional("style", "Lighting and mood"),
        ],
        template: &[
            Text("Photorealistic product photograph, {ratio} aspect ratio."),
            Text("Subject: {subject}."),
            IfSet("setting", "Setting: {setting}."),
            IfSet("style", "Lighting and mood: {style}."),
            Background,
            Text("Sharp focus, natural shadows, no text or watermark."),
        ],
        default_aspect: AspectRatio::Landscape,
        generative: true,
    },
    ToolDescriptor {
        id: "business_card",
        label: "Business Card",
        asset_prefix: "business_card",
        fields: &[
            required("name", "Full name"),
            optional("job_title", "Job title"),
            optional("company", "Company"),
            notes("contact", "Contact details"),
            required("graphic", "Design motif"),
        ],
        template: &[
            Text("Business card front design, {ratio} aspect ratio."),
            Background,
            Text("Name: \"{name}\"."),
            IfSet("job_title", "Title: \"{job_title}\"."),
            IfSet("company", "Company: \"{company}\"."),
            IfSet("contact", "Contact: \"{contact}\"."),
            Text("Design motif: {graphic}."),
            Text("Print-ready layout with generous margins."),
        ],
        default_aspect: AspectRatio::Landscape,
        generative: true,
    },
    ToolDescriptor {
        id: "certificate",
        label: "Certificate",
        asset_prefix: "certificate",
        fields: &[
            required("title", "Certificate title"),
            required("name", "Recipient name"),
            notes("details", "Citation"),
            optional("graphic", "Border or emblem"),
        ],
        template: &[
            Text("Certificate design, {ratio} aspect ratio."),
            Background,
            Text("Title: \"{title}\"."),
            Text("Awarded to: \"{name}\"."),
            IfSet("details", "Citation: \"{details}\"."),
            IfSet("graphic", "Decoration: {graphic}."),
            Text("Elegant, formal typography with an ornamental frame."),
        ],
        default_aspect: AspectRatio::Landscape,
        generative: true,
    },
    ToolDescriptor {
        id: "packaging",
        label: "Packaging",
        asset_prefix: "packaging",
        fields: &[
            required("product", "Product name"),
            required("graphic", "Artwork description"),
            optional("style", "Style"),
            notes("details", "Label copy"),
        ],
        template: &[
            Text("Packaging label artwork, {ratio} aspect ratio."),
            Background,
            Text("Product: \"{product}\"."),
            IfSet("details", "Label copy: \"{details}\"."),
            Text("Artwork: {graphic}."),
            IfSet("style", "Style: {style}."),
            Text("Flat print layout, not a 3D render of the package."),
        ],
        default_aspect: AspectRatio::Square,
        generative: true,
    },
    ToolDescriptor {
        id: "illustration",
        label: "Illustration",
        asset_prefix: "illustration",
        fields: &[
            required("subject", "Subject"),
            optional("style", "Style"),
            notes("details", "Details"),
        ],
        template: &[
            Text("Illustration, {ratio} aspect ratio."),
            Text("Subject: {subject}."),
            IfSet("details", "Details: {details}."),
            IfSet("style", "Style: {style}."),
            Background,
        ],
        default_aspect: AspectRatio::Square,
        generative: true,
    },
    ToolDescriptor {
        id: "mockup",
        label: "Mockup",
        asset_prefix: "mockup",
        fields: &[
            required("product", "Product"),
            required("graphic", "Design to show"),
            optional("setting", "Scene"),
        ],
        template: &[
            Text("Realistic product mockup, {ratio} aspect ratio."),
            Text("Product: {product} showing this design: {graphic}."),
            IfSet("setting", "Scene: {setting}."),
            Background,
            Text("Accurate perspective and fabric or material texture."),
        ],
        default_aspect: AspectRatio::Landscape,
        generative: true,
    },
    ToolDescriptor {
        id: "invitation",
        label: "Invitation",
        asset_prefix: "invitation",
        fields: &[
            required("occasion", "Occasion"),
            required("title", "Headline"),
            notes("details", "Date, time and place"),
            optional("graphic", "Decoration"),
        ],
        template: &[
            Text("Invitation card design, {ratio} aspect ratio, for a {occasion}."),
            Background,
            Text("Headline: \"{title}\"."),
            IfSet("details", "Details: \"{details}\"."),
            IfSet("graphic", "Decoration: {graphic}."),
            Text("Warm, celebratory layout with readable script and serif type."),
        ],
        default_aspect: AspectRatio::Portrait,
        generative: true,
    },
    ToolDescriptor {
        id: "upload",
        label: "Uploads",
        asset_prefix: "upload",
        fields: &[optional("name", "Name")],
        template: &[],
        default_aspect: AspectRatio::Square,
        generative: false,
    },
];

pub fn all_tools() -> &'static [ToolDescriptor] {
    &TOOLS
}

pub fn find_tool(id: &str) -> Option<&'static ToolDescriptor> {
    let id = id.trim();
    TOOLS.iter().find(|tool| tool.id == id)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{all_tools, find_tool, PromptPart};

    #[test]
    fn every_generative_tool_has_a_required_field_and_template() {
        for tool in all_tools().iter().filter(|tool| tool.generative) {
            assert!(
                tool.fields.iter().any(|field| field.required),
                "{} has no required field",
                tool.id
            );
            assert!(
                tool.template.contains(&PromptPart::Background),
                "{} has no background clause",
                tool.id
            );
        }
    }

    #[test]
    fn template_placeholders_name_declared_fields() {
        for tool in all_tools() {
            for part in tool.template {
                let (gate, text) = match part {
                    PromptPart::Text(text) => (None, *text),
                    PromptPart::IfSet(field, text) => (Some(*field), *text),
                    PromptPart::Background => continue,
                };
                if let Some(gate) = gate {
                    assert!(tool.field(gate).is_some(), "{}: {gate}", tool.id);
                }
                for placeholder in text.split('{').skip(1) {
                    let name = placeholder.split('}').next().unwrap_or_default();
                    assert!(
                        name == "ratio" || name == "bg" || tool.field(name).is_some(),
                        "{}: unknown placeholder {name}",
                        tool.id
                    );
                }
            }
        }
    }

    #[test]
    fn ids_and_store_files_are_unique() {
        let ids: HashSet<&str> = all_tools().iter().map(|tool| tool.id).collect();
        assert_eq!(ids.len(), all_tools().len());
        assert_eq!(
            find_tool("business_card").map(|tool| tool.store_file()),
            Some("business_card_designs.json".to_string())
        );
        assert!(find_tool("banner").is_none());
    }
}
