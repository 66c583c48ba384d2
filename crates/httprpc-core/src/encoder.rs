//! Request body encoding for argument sets and attachments.
//!
//! Without attachments the arguments are sent as
//! `application/x-www-form-urlencoded`; with at least one attachment the
//! whole request becomes `multipart/form-data`. A sequence contributes one
//! field per element, in order, all under the parameter's name. Null values
//! contribute nothing.

use crate::arguments::Arguments;
use crate::attachment::Attachments;
use crate::error::{Result, RpcError};
use crate::value::Value;
use reqwest::multipart::{Form, Part};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// An encoded request body ready for submission.
pub enum EncodedBody {
    Form(String),
    Multipart(Form),
}

impl EncodedBody {
    /// Value of the `Content-Type` request header.
    pub fn content_type(&self) -> String {
        match self {
            EncodedBody::Form(_) => FORM_CONTENT_TYPE.to_string(),
            EncodedBody::Multipart(form) => {
                format!("multipart/form-data; boundary={}", form.boundary())
            }
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, EncodedBody::Multipart(_))
    }
}

impl std::fmt::Debug for EncodedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodedBody::Form(body) => f.debug_tuple("Form").field(body).finish(),
            EncodedBody::Multipart(form) => f
                .debug_struct("Multipart")
                .field("boundary", &form.boundary())
                .finish(),
        }
    }
}

/// A single field produced from an argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Textual form of a scalar.
    Text(String),
    /// JSON rendering of a nested value (multipart only).
    Structured(String),
}

/// Encode an argument set and its attachments into a request body.
///
/// Attachment files are opened here, so a missing or unreadable file fails
/// before any network I/O.
pub fn encode(arguments: &Arguments, attachments: &Attachments) -> Result<EncodedBody> {
    if attachments.is_empty() {
        encode_form(arguments).map(EncodedBody::Form)
    } else {
        encode_multipart(arguments, attachments).map(EncodedBody::Multipart)
    }
}

/// Flatten an argument set into ordered `(name, text)` form fields.
pub fn form_fields(arguments: &Arguments) -> Result<Vec<(String, String)>> {
    let mut fields = Vec::new();
    for (name, value) in arguments {
        for field in argument_fields(name, value, false)? {
            match field {
                Field::Text(text) => fields.push((name.clone(), text)),
                Field::Structured(_) => {
                    return Err(unsupported(name, "structured value cannot be form-encoded"))
                }
            }
        }
    }
    Ok(fields)
}

/// Encode an argument set as `application/x-www-form-urlencoded`.
pub fn encode_form(arguments: &Arguments) -> Result<String> {
    let fields = form_fields(arguments)?;
    Ok(fields
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&"))
}

fn encode_multipart(arguments: &Arguments, attachments: &Attachments) -> Result<Form> {
    let mut form = Form::new();

    for (name, value) in arguments {
        for field in argument_fields(name, value, true)? {
            form = match field {
                Field::Text(text) => form.text(name.clone(), text),
                Field::Structured(json) => {
                    let part = Part::text(json)
                        .mime_str(JSON_CONTENT_TYPE)
                        .map_err(|e| unsupported(name, &e.to_string()))?;
                    form.part(name.clone(), part)
                }
            };
        }
    }

    for (name, list) in attachments.iter() {
        for (i, attachment) in list.iter().enumerate() {
            form = form.part(name.clone(), attachment.open_part(name, i + 1)?);
        }
    }

    Ok(form)
}

/// Produce the fields for one argument.
///
/// `structured_allowed` selects the multipart rules, where nested values are
/// sent as JSON parts instead of being rejected.
pub fn argument_fields(name: &str, value: &Value, structured_allowed: bool) -> Result<Vec<Field>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Mapping(_) if structured_allowed => Ok(vec![Field::Structured(to_json(name, value)?)]),
        Value::Mapping(_) => Err(unsupported(name, "nested mapping cannot be form-encoded")),
        Value::Sequence(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::Sequence(_) | Value::Mapping(_) if structured_allowed => {
                    Ok(Field::Structured(to_json(name, item)?))
                }
                Value::Sequence(_) | Value::Mapping(_) => Err(unsupported(
                    name,
                    &format!("nested {} element cannot be form-encoded", item.type_name()),
                )),
                scalar => Ok(Field::Text(scalar_text(scalar))),
            })
            .collect(),
        scalar => Ok(vec![Field::Text(scalar_text(scalar))]),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Text(s) => s.clone(),
        // Only scalars reach here; nested values are handled by the caller.
        other => other.to_string(),
    }
}

fn to_json(name: &str, value: &Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| unsupported(name, &e.to_string()))
}

fn unsupported(name: &str, reason: &str) -> RpcError {
    RpcError::UnsupportedArgumentShape {
        parameter: name.to_string(),
        reason: reason.to_string(),
    }
}
