//! Input rules for registration, login, and password changes.
//!
//! Rule failures are flattened into a single [`CoreError::BadRequest`] whose
//! message lists every failing field, sorted by field name.

use std::sync::LazyLock;

use regex::Regex;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::CoreError;

/// Minimum password length accepted at registration and password change.
pub const MIN_PASSWORD_LENGTH: u64 = 8;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex is valid"));

/// Fields accepted by registration.
#[derive(Debug, Clone, Validate)]
pub struct RegisterInput {
    #[validate(
        length(min = 3, max = 50, message = "Username must be between 3 and 50 characters"),
        regex(
            path = *USERNAME_RE,
            message = "Username can only contain letters, numbers and underscores"
        )
    )]
    pub username: String,

    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,

    #[validate(
        length(min = 8, message = "Password must be at least 8 characters long"),
        custom(function = "password_complexity")
    )]
    pub password: String,
}

impl RegisterInput {
    /// Trim the identity fields and lowercase the email.
    pub fn normalized(username: &str, email: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            email: email.trim().to_lowercase(),
            password: password.to_string(),
        }
    }

    /// Run every rule, returning `BadRequest` describing all failures.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate().map_err(flatten)
    }
}

/// Require a non-empty username and password for login.
pub fn check_login(username: &str, password: &str) -> Result<(), CoreError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(CoreError::BadRequest(
            "Username and password are required".into(),
        ));
    }
    Ok(())
}

/// Apply the registration password rules to a replacement password.
pub fn check_new_password(password: &str) -> Result<(), CoreError> {
    if (password.chars().count() as u64) < MIN_PASSWORD_LENGTH {
        return Err(CoreError::BadRequest(format!(
            "New password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }
    password_complexity(password).map_err(|e| {
        CoreError::BadRequest(
            e.message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "New password is too weak".into()),
        )
    })
}

fn password_complexity(password: &str) -> Result<(), ValidationError> {
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if has_lower && has_upper && has_digit {
        Ok(())
    } else {
        Err(ValidationError::new("password_complexity").with_message(
            "Password must contain at least one uppercase letter, one lowercase letter, and one number"
                .into(),
        ))
    }
}

fn flatten(errors: ValidationErrors) -> CoreError {
    let mut messages: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| {
                let msg = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"));
                (field.clone(), msg)
            })
        })
        .collect();
    messages.sort();
    let joined = messages
        .into_iter()
        .map(|(_, msg)| msg)
        .collect::<Vec<_>>()
        .join("; ");
    CoreError::BadRequest(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn input(username: &str, email: &str, password: &str) -> RegisterInput {
        RegisterInput::normalized(username, email, password)
    }

    #[test]
    fn accepts_well_formed_registration() {
        assert!(input("alice", "a@x.com", "Passw0rd1").check().is_ok());
    }

    #[test]
    fn normalizes_email_and_username() {
        let normalized = input("  alice ", " A@X.com ", "Passw0rd1");
        assert_eq!(normalized.username, "alice");
        assert_eq!(normalized.email, "a@x.com");
    }

    #[test]
    fn rejects_short_and_symbolic_usernames() {
        assert_matches!(
            input("al", "a@x.com", "Passw0rd1").check(),
            Err(CoreError::BadRequest(msg)) if msg.contains("between 3 and 50")
        );
        assert_matches!(
            input("al-ice", "a@x.com", "Passw0rd1").check(),
            Err(CoreError::BadRequest(msg)) if msg.contains("letters, numbers and underscores")
        );
    }

    #[test]
    fn rejects_invalid_email() {
        assert_matches!(
            input("alice", "not-an-email", "Passw0rd1").check(),
            Err(CoreError::BadRequest(msg)) if msg.contains("valid email")
        );
    }

    #[test]
    fn rejects_weak_passwords() {
        assert_matches!(
            input("alice", "a@x.com", "Pw0").check(),
            Err(CoreError::BadRequest(msg)) if msg.contains("at least 8")
        );
        assert_matches!(
            input("alice", "a@x.com", "password1").check(),
            Err(CoreError::BadRequest(msg)) if msg.contains("uppercase")
        );
    }

    #[test]
    fn login_requires_both_fields() {
        assert!(check_login("alice", "secret").is_ok());
        assert_matches!(check_login("  ", "secret"), Err(CoreError::BadRequest(_)));
        assert_matches!(check_login("alice", ""), Err(CoreError::BadRequest(_)));
    }

    #[test]
    fn new_password_follows_registration_rules() {
        assert!(check_new_password("N3wPassword").is_ok());
        assert_matches!(check_new_password("short"), Err(CoreError::BadRequest(_)));
        assert_matches!(check_new_password("alllowercase1"), Err(CoreError::BadRequest(_)));
    }
}
