use crate::domain::DomainError;
use garde::{Report, Validate};

/// Validate a value, collecting every offending field path into a `DomainError::ValidationError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(field_errors(&report)))
}

/// Like [`validate_struct`], but field names in the reported paths are camelCased
/// to match a `#[serde(rename_all = "camelCase")]` wire shape
pub fn validate_wire_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value.validate().map_err(|report| {
        DomainError::ValidationError(format_errors(&report, camel_case_path))
    })
}

/// One `path: message` entry per violation, in report order
pub fn field_errors(report: &Report) -> Vec<String> {
    format_errors(report, |path| path.to_string())
}

fn format_errors(report: &Report, render_path: impl Fn(&str) -> String) -> Vec<String> {
    report
        .iter()
        .map(|(path, error)| {
            let path = render_path(&path.to_string());
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect()
}

/// `events[1].tenant_id` -> `events[1].tenantId`
fn camel_case_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        let joins_word = c == '_'
            && out.chars().last().is_some_and(|p| p.is_ascii_alphanumeric())
            && chars.peek().is_some_and(|n| n.is_ascii_alphanumeric());
        if joins_word {
            if let Some(next) = chars.next() {
                out.push(next.to_ascii_uppercase());
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;

    #[derive(Validate)]
    struct TestRequest {
        #[garde(length(min = 1))]
        field: String,
        #[garde(required)]
        other: Option<String>,
    }

    #[test]
    fn test_validate_success() {
        let request = TestRequest {
            field: "value".to_string(),
            other: Some("x".to_string()),
        };
        assert!(validate_struct(&request).is_ok());
    }

    #[test]
    fn test_validate_reports_every_field() {
        let request = TestRequest {
            field: "".to_string(),
            other: None,
        };
        match validate_struct(&request) {
            Err(DomainError::ValidationError(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().any(|e| e.starts_with("field")));
                assert!(errors.iter().any(|e| e.starts_with("other")));
            }
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[derive(Validate)]
    struct WireEvent {
        #[garde(required, length(min = 1))]
        tenant_id: Option<String>,
    }

    #[derive(Validate)]
    struct WireBatch {
        #[garde(dive)]
        events: Vec<WireEvent>,
    }

    #[test]
    fn test_wire_paths_are_camel_cased() {
        let batch = WireBatch {
            events: vec![
                WireEvent {
                    tenant_id: Some("t1".to_string()),
                },
                WireEvent { tenant_id: None },
            ],
        };
        match validate_wire_struct(&batch) {
            Err(DomainError::ValidationError(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("events[1].tenantId"), "{}", errors[0]);
            }
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_camel_case_path() {
        assert_eq!(camel_case_path("events[12].event_id"), "events[12].eventId");
        assert_eq!(camel_case_path("payload.value"), "payload.value");
        assert_eq!(camel_case_path("_private"), "_private");
    }
}
