//! Client-side form checks run before a request is sent.
//!
//! Every check reports all failing fields at once so a front end can show
//! them together. Lengths are counted in characters.

use std::fmt;

use thiserror::Error;

use crate::models::{CommentRequest, PostRequest, RegisterRequest};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 20;
pub const NICKNAME_MIN: usize = 2;
pub const NICKNAME_MAX: usize = 50;
pub const TITLE_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Email,
    Password,
    ConfirmPassword,
    Nickname,
    Title,
    Content,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Username => "Username",
            Field::Email => "Email",
            Field::Password => "Password",
            Field::ConfirmPassword => "Password confirmation",
            Field::Nickname => "Nickname",
            Field::Title => "Title",
            Field::Content => "Content",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(Field),

    #[error("{field} must be at least {min} characters")]
    TooShort { field: Field, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: Field, max: usize },

    #[error("Email address is not valid")]
    InvalidEmail,

    #[error("Passwords do not match")]
    PasswordMismatch,
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            ValidationError::Required(field)
            | ValidationError::TooShort { field, .. }
            | ValidationError::TooLong { field, .. } => *field,
            ValidationError::InvalidEmail => Field::Email,
            ValidationError::PasswordMismatch => Field::ConfirmPassword,
        }
    }
}

/// All failures found in one form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", join_messages(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn for_field(&self, field: Field) -> Option<&ValidationError> {
        self.0.iter().find(|e| e.field() == field)
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn finish(errors: Vec<ValidationError>) -> Result<(), ValidationErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

/// Required after trimming, then bounded by character count
fn check_length(
    errors: &mut Vec<ValidationError>,
    field: Field,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.push(ValidationError::Required(field));
    } else if len < min {
        errors.push(ValidationError::TooShort { field, min });
    } else if len > max {
        errors.push(ValidationError::TooLong { field, max });
    }
}

/// Loose `local@domain.tld` shape check: no whitespace inside the address,
/// something before the `@`, and a dot with text on both sides after it
pub fn is_valid_email(email: &str) -> bool {
    email.split_whitespace().any(|token| {
        token.char_indices().any(|(at, c)| {
            if c != '@' || at == 0 {
                return false;
            }
            let domain = &token[at + 1..];
            domain
                .char_indices()
                .any(|(dot, c)| c == '.' && dot > 0 && dot + 1 < domain.len())
        })
    })
}

pub fn validate_login(username: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    if username.trim().is_empty() {
        errors.push(ValidationError::Required(Field::Username));
    }
    if password.is_empty() {
        errors.push(ValidationError::Required(Field::Password));
    }
    finish(errors)
}

pub fn validate_register(
    request: &RegisterRequest,
    confirm_password: &str,
) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    check_length(
        &mut errors,
        Field::Username,
        &request.username,
        USERNAME_MIN,
        USERNAME_MAX,
    );

    if request.email.trim().is_empty() {
        errors.push(ValidationError::Required(Field::Email));
    } else if !is_valid_email(&request.email) {
        errors.push(ValidationError::InvalidEmail);
    }

    // Passwords are not trimmed
    let password_len = request.password.chars().count();
    if password_len == 0 {
        errors.push(ValidationError::Required(Field::Password));
    } else if password_len < PASSWORD_MIN {
        errors.push(ValidationError::TooShort {
            field: Field::Password,
            min: PASSWORD_MIN,
        });
    } else if password_len > PASSWORD_MAX {
        errors.push(ValidationError::TooLong {
            field: Field::Password,
            max: PASSWORD_MAX,
        });
    }
    if request.password != confirm_password {
        errors.push(ValidationError::PasswordMismatch);
    }

    check_length(
        &mut errors,
        Field::Nickname,
        &request.nickname,
        NICKNAME_MIN,
        NICKNAME_MAX,
    );

    finish(errors)
}

pub fn validate_post(request: &PostRequest) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    check_length(&mut errors, Field::Title, &request.title, 1, TITLE_MAX);
    if request.content.trim().is_empty() {
        errors.push(ValidationError::Required(Field::Content));
    }
    finish(errors)
}

pub fn validate_comment(request: &CommentRequest) -> Result<(), ValidationErrors> {
    if request.content.trim().is_empty() {
        return finish(vec![ValidationError::Required(Field::Content)]);
    }
    Ok(())
}
