//! Command-line argument parsing for procedure parameters.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use httprpc::{Arguments, Attachment, Attachments, Value};

/// Split a `NAME=VALUE` pair.
fn split_pair(raw: &str) -> Result<(&str, &str)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'", raw))?;
    if name.is_empty() {
        return Err(anyhow!("Missing parameter name in '{}'", raw));
    }
    Ok((name, value))
}

/// Interpret a value as a JSON scalar or array, falling back to text.
pub fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        // A bare `null` would drop the argument and mappings are not
        // form-encodable; both go through as text.
        Ok(Value::Mapping(_)) | Ok(Value::Null) | Err(_) => Value::from(raw),
        Ok(value) => value,
    }
}

/// Build the argument set from `NAME=VALUE` pairs. A repeated name
/// accumulates a sequence.
pub fn parse_arguments<S: AsRef<str>>(pairs: &[S]) -> Result<Arguments> {
    let mut arguments = Arguments::new();

    for pair in pairs {
        let (name, raw) = split_pair(pair.as_ref())?;
        let value = parse_value(raw);

        let merged = match arguments.get(name).cloned() {
            None => value,
            Some(Value::Sequence(mut items)) => {
                items.push(value);
                Value::Sequence(items)
            }
            Some(previous) => Value::Sequence(vec![previous, value]),
        };
        arguments.insert(name, merged);
    }

    Ok(arguments)
}

/// Build the attachment set from `NAME=PATH` pairs.
pub fn parse_attachments<S: AsRef<str>>(pairs: &[S]) -> Result<Attachments> {
    let mut attachments = Attachments::new();
    for pair in pairs {
        let (name, path) = split_pair(pair.as_ref())?;
        attachments.add(name, Attachment::file(PathBuf::from(path)));
    }
    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("2"), Value::from(2));
        assert_eq!(parse_value("4.5"), Value::from(4.5));
        assert_eq!(parse_value("true"), Value::from(true));
        assert_eq!(parse_value("[1, 2, 3]"), Value::from(vec![1, 2, 3]));
        assert_eq!(parse_value("\"quoted\""), Value::from("quoted"));
        assert_eq!(parse_value("Hello, World!"), Value::from("Hello, World!"));
        assert_eq!(parse_value("null"), Value::from("null"));
        assert_eq!(parse_value("{\"a\": 1}"), Value::from("{\"a\": 1}"));
    }

    #[test]
    fn test_parse_arguments_accumulates_repeats() {
        let args = parse_arguments(&["a=1", "values=1", "values=2", "values=3", "text=x=y"]).unwrap();

        assert_eq!(args.get("a"), Some(&Value::from(1)));
        assert_eq!(args.get("values"), Some(&Value::from(vec![1, 2, 3])));
        assert_eq!(args.get("text"), Some(&Value::from("x=y")));
    }

    #[test]
    fn test_parse_arguments_rejects_malformed_pairs() {
        assert!(parse_arguments(&["novalue"]).is_err());
        assert!(parse_arguments(&["=1"]).is_err());
    }

    #[test]
    fn test_parse_attachments() {
        let attachments =
            parse_attachments(&["attachments=/tmp/a.txt", "attachments=/tmp/b.txt"]).unwrap();
        assert_eq!(attachments.len(), 2);
        assert!(parse_attachments(&["/tmp/a.txt"]).is_err());
    }
}
