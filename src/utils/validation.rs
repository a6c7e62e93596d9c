use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::{AppError, AppResult};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

const MAX_FILE_NAME_LEN: usize = 255;

pub fn validate_email(email: &str) -> AppResult<()> {
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }

    if email.len() > 254 {
        return Err(AppError::Validation(
            "Email must be at most 254 characters long".to_string(),
        ));
    }

    if !EMAIL_RE.is_match(email) {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be at most 128 characters long".to_string(),
        ));
    }

    Ok(())
}

/// Reduces a client supplied file name to its last path segment with
/// control characters removed. Empty results are rejected.
pub fn sanitize_file_name(name: &str) -> AppResult<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(AppError::Validation("File name cannot be empty".to_string()));
    }

    if cleaned.len() > MAX_FILE_NAME_LEN {
        return Err(AppError::Validation(format!(
            "File name must be at most {} bytes long",
            MAX_FILE_NAME_LEN
        )));
    }

    Ok(cleaned.to_string())
}
