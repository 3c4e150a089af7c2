//! Structural validation of untrusted input.
//!
//! Runs before the credential, token, cipher and audit components see a value.
//! Every rejection names the field and a reason code.

use serde_json::Value;

use crate::error::{ReasonCode, ValidationError};
use crate::principal::TenantId;

pub const MAX_USERNAME_LEN: usize = 254;
pub const MIN_USERNAME_LEN: usize = 3;
/// Upper bound on password input; keeps hashing cost bounded.
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_TOKEN_LEN: usize = 4096;
pub const MAX_IDENTIFIER_LEN: usize = 64;
pub const MAX_ENTITY_ID_LEN: usize = 128;
pub const MAX_SNAPSHOT_BYTES: usize = 64 * 1024;
pub const MAX_SNAPSHOT_DEPTH: usize = 16;

/// Login names: e-mail style or plain handles.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "username";
    check_length(FIELD, username, MIN_USERNAME_LEN, MAX_USERNAME_LEN)?;
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@' | '+');
    if !username.chars().all(allowed) {
        return Err(ValidationError::malformed(FIELD, ReasonCode::InvalidCharacter));
    }
    Ok(())
}

/// Bounds on raw password input. Strength policy is enforced by the credential manager.
pub fn validate_password_input(password: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "password";
    if password.is_empty() {
        return Err(ValidationError::malformed(FIELD, ReasonCode::Empty));
    }
    if password.chars().count() > MAX_PASSWORD_LEN {
        return Err(ValidationError::malformed(FIELD, ReasonCode::TooLong));
    }
    if password.contains('\0') {
        return Err(ValidationError::malformed(FIELD, ReasonCode::InvalidCharacter));
    }
    Ok(())
}

/// A compact signed token: three non-empty base64url segments.
pub fn validate_token_shape(token: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "token";
    if token.is_empty() {
        return Err(ValidationError::malformed(FIELD, ReasonCode::Empty));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(ValidationError::malformed(FIELD, ReasonCode::TooLong));
    }
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(ValidationError::malformed(FIELD, ReasonCode::InvalidFormat));
    }
    let base64url = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !segments.iter().all(|s| s.chars().all(base64url)) {
        return Err(ValidationError::malformed(FIELD, ReasonCode::InvalidCharacter));
    }
    Ok(())
}

/// Lower-case machine identifiers such as audit actions and entity types.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    check_length(field, value, 1, MAX_IDENTIFIER_LEN)?;
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-');
    if !value.chars().all(allowed) {
        return Err(ValidationError::malformed(field, ReasonCode::InvalidCharacter));
    }
    Ok(())
}

/// Opaque entity identifiers: printable, no whitespace.
pub fn validate_entity_id(value: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "entity_id";
    check_length(FIELD, value, 1, MAX_ENTITY_ID_LEN)?;
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::malformed(FIELD, ReasonCode::InvalidCharacter));
    }
    Ok(())
}

pub fn parse_tenant_id(value: &str) -> Result<TenantId, ValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ValidationError::malformed("tenant_id", ReasonCode::InvalidFormat))
}

/// Bound the size and nesting of a JSON snapshot.
pub fn validate_snapshot(field: &'static str, snapshot: &Value) -> Result<(), ValidationError> {
    if depth(snapshot) > MAX_SNAPSHOT_DEPTH {
        return Err(ValidationError::malformed(field, ReasonCode::TooDeep));
    }
    let size = serde_json::to_vec(snapshot).map(|v| v.len()).unwrap_or(usize::MAX);
    if size > MAX_SNAPSHOT_BYTES {
        return Err(ValidationError::malformed(field, ReasonCode::TooLong));
    }
    Ok(())
}

/// Strip control characters and surrounding whitespace from free text.
pub fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

fn check_length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len == 0 {
        Err(ValidationError::malformed(field, ReasonCode::Empty))
    } else if len < min {
        Err(ValidationError::malformed(field, ReasonCode::TooShort))
    } else if len > max {
        Err(ValidationError::malformed(field, ReasonCode::TooLong))
    } else {
        Ok(())
    }
}

fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("dpo@example.org").is_ok());
        assert_eq!(
            validate_username("ab").unwrap_err().reason(),
            ReasonCode::TooShort
        );
        assert_eq!(
            validate_username("robert'); DROP TABLE").unwrap_err().reason(),
            ReasonCode::InvalidCharacter
        );
        assert_eq!(validate_username("").unwrap_err().reason(), ReasonCode::Empty);
    }

    #[test]
    fn test_password_input_bounds() {
        assert!(validate_password_input("anything goes here").is_ok());
        assert!(validate_password_input("").is_err());
        assert_eq!(
            validate_password_input(&"x".repeat(MAX_PASSWORD_LEN + 1))
                .unwrap_err()
                .reason(),
            ReasonCode::TooLong
        );
        assert!(validate_password_input("nul\0byte").is_err());
    }

    #[test]
    fn test_token_shape() {
        assert!(validate_token_shape("eyJhbGciOi.eyJzdWIiOi.c2lnbmF0dXJl").is_ok());
        assert_eq!(
            validate_token_shape("only.two").unwrap_err().reason(),
            ReasonCode::InvalidFormat
        );
        assert_eq!(
            validate_token_shape("a.b c.d").unwrap_err().reason(),
            ReasonCode::InvalidCharacter
        );
        assert_eq!(
            validate_token_shape(&"a".repeat(MAX_TOKEN_LEN + 1)).unwrap_err().reason(),
            ReasonCode::TooLong
        );
    }

    #[test]
    fn test_identifiers() {
        assert!(validate_identifier("action", "login_success").is_ok());
        assert!(validate_identifier("entity_type", "processing_activity").is_ok());
        assert!(validate_identifier("action", "Login").is_err());
        assert!(validate_entity_id("pa-2024-001").is_ok());
        assert!(validate_entity_id("has space").is_err());
    }

    #[test]
    fn test_snapshot_limits() {
        assert!(validate_snapshot("after", &json!({"name": "Jane", "tags": [1, 2]})).is_ok());

        let mut deep = json!(1);
        for _ in 0..(MAX_SNAPSHOT_DEPTH + 1) {
            deep = json!([deep]);
        }
        assert_eq!(
            validate_snapshot("after", &deep).unwrap_err().reason(),
            ReasonCode::TooDeep
        );

        let big = json!({"blob": "x".repeat(MAX_SNAPSHOT_BYTES)});
        assert_eq!(
            validate_snapshot("before", &big).unwrap_err().reason(),
            ReasonCode::TooLong
        );
    }

    #[test]
    fn test_parse_tenant_and_sanitize() {
        let tenant = TenantId::new();
        assert_eq!(parse_tenant_id(&tenant.to_string()).unwrap(), tenant);
        assert!(parse_tenant_id("acme").is_err());
        assert_eq!(sanitize_text("  hello\u{0007} world \n"), "hello world");
    }
}
