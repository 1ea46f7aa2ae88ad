//! Multipart intake and customer field validation.

use std::collections::HashMap;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use bytes::Bytes;

use crate::errors::AppError;
use crate::orders::models::Customer;

pub const FILE_FIELD: &str = "file";

#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// A parsed multipart body: at most one file plus text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == FILE_FIELD {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "resume".to_string());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(UploadedFile { filename, bytes });
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value.trim().to_string());
            }
        }
        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// The uploaded file, rejecting a missing or empty one.
    pub fn take_file(&mut self) -> Result<UploadedFile, AppError> {
        match self.file.take() {
            Some(file) if !file.bytes.is_empty() => Ok(file),
            Some(_) => Err(AppError::Validation("Uploaded file is empty".into())),
            None => Err(AppError::Validation("A file is required".into())),
        }
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// At least two whitespace-separated tokens.
pub fn validate_name(name: &str) -> Result<String, AppError> {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(AppError::Validation(
            "Please provide your full name (first and last)".into(),
        ));
    }
    Ok(tokens.join(" "))
}

/// One `@`, a non-empty local part and a dotted domain with no empty labels.
pub fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    let invalid = || AppError::Validation("Please provide a valid email address".into());
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty());
    if !well_formed {
        return Err(invalid());
    }
    Ok(email.to_string())
}

pub fn customer_from(
    name: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<Customer, AppError> {
    Ok(Customer {
        name: validate_name(name.unwrap_or_default())?,
        email: validate_email(email.unwrap_or_default())?,
        phone: phone
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_needs_two_tokens() {
        assert_eq!(validate_name("  Jane   Doe ").unwrap(), "Jane Doe");
        assert_eq!(validate_name("Mary Anne Smith").unwrap(), "Mary Anne Smith");
        assert!(validate_name("Jane").is_err());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_email_shape() {
        assert_eq!(validate_email(" jane@example.com ").unwrap(), "jane@example.com");
        assert!(validate_email("jane.doe+cv@mail.example.co.uk").is_ok());
        for bad in ["jane", "jane@", "@example.com", "jane@example", "jane@example.", "a@b@c.com", "ja ne@x.com"] {
            assert!(validate_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_customer_from_fields() {
        let customer = customer_from(Some("Jane Doe"), Some("jane@example.com"), Some(" ")).unwrap();
        assert_eq!(customer.phone, None);
        assert!(customer_from(None, Some("jane@example.com"), None).is_err());
    }
}
