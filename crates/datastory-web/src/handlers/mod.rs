//! HTTP handlers for all API routes.

pub mod analyze;
pub mod datasets;
pub mod figures;

use axum::extract::Multipart;

use crate::error::ApiError;

/// Fields of a multipart form, read in one pass.
#[derive(Debug, Default)]
pub(crate) struct FormFields {
    pub texts: Vec<(String, String)>,
    /// `(field name, file name, contents)`.
    pub files: Vec<(String, String, Vec<u8>)>,
}

impl FormFields {
    pub async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut fields = FormFields::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await?;
                    fields.files.push((name, file_name, bytes.to_vec()));
                }
                None => {
                    let text = field.text().await?;
                    fields.texts.push((name, text));
                }
            }
        }
        Ok(fields)
    }

    /// Non-blank text field value.
    pub fn text(&self, name: &str) -> Option<String> {
        self.texts
            .iter()
            .find(|(n, v)| n == name && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
    }

    pub fn take_file(&mut self, name: &str) -> Option<(String, Vec<u8>)> {
        let index = self.files.iter().position(|(n, _, _)| n == name)?;
        let (_, file_name, bytes) = self.files.swap_remove(index);
        Some((file_name, bytes))
    }
}
