//! Request validation for the Upkeep API.
//!
//! Field-presence, format (email, phone, HH:MM times) and enum checks with
//! machine-readable error codes.

use crate::error::{AppError, ApiResult};
use chrono::NaiveDate;
use std::collections::HashMap;
use upkeep_shared::DAYS_OF_WEEK;

/// Validate email format: `local@domain.tld`.
pub fn is_valid_email(value: &str) -> bool {
    let email = value.trim();
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return false;
    }
    // Domain must contain at least one dot with something on both sides
    let domain = parts[1];
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Validate a phone number: digits with optional leading `+`, 7-15 digits.
pub fn is_valid_phone(value: &str) -> bool {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    digits.len() >= 7 && digits.len() <= 15 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Validate an HH:MM 24-hour time string.
pub fn is_valid_time(value: &str) -> bool {
    let Some((h, m)) = value.split_once(':') else {
        return false;
    };
    if h.len() != 2 || m.len() != 2 {
        return false;
    }
    match (h.parse::<u8>(), m.parse::<u8>()) {
        (Ok(hours), Ok(minutes)) => hours < 24 && minutes < 60,
        _ => false,
    }
}

/// Validate a day-of-week name (lowercase english).
pub fn is_valid_day_of_week(value: &str) -> bool {
    DAYS_OF_WEEK.contains(&value.trim().to_lowercase().as_str())
}

/// Parse a date string (YYYY-MM-DD) or fail with the given code.
pub fn parse_date(value: &str, code: &'static str) -> ApiResult<NaiveDate> {
    value
        .trim()
        .parse::<NaiveDate>()
        .map_err(|_| AppError::bad_request(code, format!("Unparseable date: {}", value)))
}

/// Validate value is one of allowed options, normalising to lowercase.
pub fn one_of(value: &str, field: &str, allowed: &[&str]) -> ApiResult<String> {
    let lower = value.trim().to_lowercase();
    if allowed.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        let mut details = HashMap::new();
        details.insert(
            field.to_string(),
            vec![format!("{} must be one of: {}", field, allowed.join(", "))],
        );
        Err(AppError::ValidationError { details })
    }
}

/// Collect the names of required fields that are absent or blank.
pub fn missing_fields(fields: &[(&'static str, &str)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("test@example.com"));
        assert!(is_valid_email("  user.name@sub.domain.org "));
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("no@domain"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@.com"));
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("+14155552671"));
        assert!(is_valid_phone("0401234567"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("phone-number"));
    }

    #[test]
    fn test_time_validation() {
        assert!(is_valid_time("09:30"));
        assert!(is_valid_time("23:59"));
        assert!(!is_valid_time("24:00"));
        assert!(!is_valid_time("9:30"));
        assert!(!is_valid_time("09:60"));
        assert!(!is_valid_time("0930"));
    }

    #[test]
    fn test_day_of_week() {
        assert!(is_valid_day_of_week("Monday"));
        assert!(is_valid_day_of_week("sunday"));
        assert!(!is_valid_day_of_week("funday"));
    }

    #[test]
    fn test_missing_fields() {
        let missing = missing_fields(&[
            ("company_name", "Acme"),
            ("contact_person", "  "),
            ("address", ""),
        ]);
        assert_eq!(missing, vec!["contact_person", "address"]);
    }

    #[test]
    fn test_one_of_normalises() {
        assert_eq!(
            one_of("Pending", "status", upkeep_shared::CONTRACT_STATUSES).unwrap(),
            "pending"
        );
        assert!(one_of("bogus", "status", upkeep_shared::CONTRACT_STATUSES).is_err());
    }
}
