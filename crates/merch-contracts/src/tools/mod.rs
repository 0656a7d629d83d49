mod aspect;
mod descriptor;
mod request;

pub use aspect::{AspectRatio, AspectSpec};
pub use descriptor::{all_tools, find_tool, FieldSpec, PromptPart, ToolDescriptor};
pub use request::{
    build_prompt, DesignRequest, FormFields, ProviderKind, ReferenceImage, REFERENCE_MIME_TYPES,
};
