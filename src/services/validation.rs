//! Input checks for identity fields, passwords and file names.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::PasswordPolicyConfig;

const MAX_EMAIL_LEN: usize = 255;
const MAX_FILE_NAME_LEN: usize = 255;

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

pub fn validate_username(username: &str) -> Result<(), String> {
    static RE: OnceLock<Regex> = OnceLock::new();

    if username.trim().is_empty() {
        return Err("Username cannot be blank".to_string());
    }
    if username.chars().count() < 3 {
        return Err("Username must be at least 3 characters".to_string());
    }
    if username.chars().count() > 50 {
        return Err("Username cannot exceed 50 characters".to_string());
    }
    if !get_regex(&RE, r"^[a-zA-Z0-9_]{3,50}$").is_match(username) {
        return Err("Username can only contain letters, numbers, and underscores".to_string());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    static RE: OnceLock<Regex> = OnceLock::new();

    if email.trim().is_empty() {
        return Err("Email cannot be blank".to_string());
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err("Email is too long".to_string());
    }
    let re = get_regex(
        &RE,
        r"^[a-zA-Z0-9_+&*-]+(?:\.[a-zA-Z0-9_+&*-]+)*@(?:[a-zA-Z0-9-]+\.)+[a-zA-Z]{2,7}$",
    );
    if !re.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Checks length and the complexity rules enabled in `policy`.
pub fn validate_password(password: &str, policy: &PasswordPolicyConfig) -> Result<(), String> {
    static SPECIAL: OnceLock<Regex> = OnceLock::new();

    if password.trim().is_empty() {
        return Err("Password cannot be blank".to_string());
    }
    if password.chars().count() < policy.min_length {
        return Err(format!(
            "Password must be at least {} characters",
            policy.min_length
        ));
    }
    if policy.require_special && !get_regex(&SPECIAL, r#"[!@#$%^&*(),.?":{}|<>]"#).is_match(password)
    {
        return Err("Password must contain at least one special character".to_string());
    }
    if policy.require_number && !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    Ok(())
}

pub fn validate_file_name(file_name: &str) -> Result<(), String> {
    if file_name.trim().is_empty() {
        return Err("File name cannot be blank".to_string());
    }
    if file_name.chars().count() > MAX_FILE_NAME_LEN {
        return Err("File name is too long".to_string());
    }
    if file_name.contains("..")
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.chars().any(char::is_control)
    {
        return Err("Invalid file name - contains forbidden characters".to_string());
    }
    Ok(())
}
