use std::collections::HashMap;

use axum::async_trait;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use merch_contracts::errors::{StudioError, StudioResult};
use merch_contracts::tools::{FormFields, ReferenceImage};

use super::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn into_reference(self) -> ReferenceImage {
        ReferenceImage {
            mime_type: self
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            file_name: self.file_name,
            bytes: self.bytes,
        }
    }

    pub fn mime_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

/// A decoded form submission, either `multipart/form-data` or urlencoded.
#[derive(Debug, Default)]
pub struct SubmittedForm {
    pub fields: FormFields,
    pub files: HashMap<String, UploadedFile>,
}

impl SubmittedForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.fields.into_iter().collect()
    }
}

/// Bodies that fail to decode become a validation error in the JSON envelope.
#[async_trait]
impl<S> FromRequest<S> for SubmittedForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim_start().starts_with("multipart/form-data"));
        if multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rejection| rejected(&rejection.body_text()))?;
            return Ok(read_multipart(multipart).await?);
        }
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
            .await
            .map_err(|rejection| rejected(&rejection.body_text()))?;
        Ok(Self {
            fields: pairs.into_iter().collect(),
            files: HashMap::new(),
        })
    }
}

/// Reads every part. Empty file inputs (browsers send them with no file chosen)
/// are dropped; repeated text fields keep the last value.
async fn read_multipart(mut multipart: Multipart) -> StudioResult<SubmittedForm> {
    let mut form = SubmittedForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_string);
        if file_name.is_some() {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(malformed)?;
            if bytes.is_empty() {
                continue;
            }
            form.files.insert(
                name,
                UploadedFile {
                    file_name: file_name.filter(|name| !name.is_empty()),
                    content_type,
                    bytes: bytes.to_vec(),
                },
            );
        } else {
            let value = field.text().await.map_err(malformed)?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

fn malformed(err: axum::extract::multipart::MultipartError) -> StudioError {
    StudioError::validation(format!("Malformed form submission: {}", err.body_text()))
}

fn rejected(detail: &str) -> ApiError {
    ApiError::Studio(StudioError::validation(format!(
        "Malformed form submission: {detail}"
    )))
}
