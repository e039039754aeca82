use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{10,15}$").unwrap());

// Zimbabwean national ID: 2-digit district, 6-7 digit serial, check letter,
// 2-digit origin code. Dashes optional, ASCII digits only.
static NATIONAL_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2}-?[0-9]{6,7}[A-Za-z]-?[0-9]{2}$").unwrap());

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").unwrap());

#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    Numeric,
    /// Inclusive numeric range; implies `Numeric`.
    Range { min: f64, max: f64 },
    Phone,
    NationalId,
    Email,
    Pattern { regex: Regex, message: String },
}

impl Rule {
    /// Check one value. Every rule except `Required` accepts blank input.
    pub fn check(&self, value: &str) -> Result<(), String> {
        let value = value.trim();
        if value.is_empty() {
            return match self {
                Rule::Required => Err("This field is required".into()),
                _ => Ok(()),
            };
        }

        match self {
            Rule::Required => Ok(()),
            Rule::Numeric => parse_number(value).map(|_| ()),
            Rule::Range { min, max } => {
                let n = parse_number(value)?;
                if n < *min || n > *max {
                    Err(format!("Must be between {} and {}", min, max))
                } else {
                    Ok(())
                }
            }
            Rule::Phone => {
                let compact: String = value
                    .chars()
                    .filter(|c| !c.is_whitespace() && *c != '-')
                    .collect();
                if PHONE_REGEX.is_match(&compact) {
                    Ok(())
                } else {
                    Err("Enter a valid phone number (10-15 digits, optional leading +)".into())
                }
            }
            Rule::NationalId => {
                if NATIONAL_ID_REGEX.is_match(value) {
                    Ok(())
                } else {
                    Err("Enter a valid national ID (e.g. 63-123456A-12)".into())
                }
            }
            Rule::Email => {
                if EMAIL_REGEX.is_match(value) {
                    Ok(())
                } else {
                    Err("Enter a valid email address".into())
                }
            }
            Rule::Pattern { regex, message } => {
                if regex.is_match(value) {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            }
        }
    }
}

fn parse_number(value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| "Must be a number".to_string())
}

/// Run `rules` in order and return the first failure.
pub fn first_failure(rules: &[Rule], value: &str) -> Option<String> {
    rules.iter().find_map(|r| r.check(value).err())
}

/// Helper messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn remove(&mut self, field: &str) {
        self.0.remove(field);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        f.write_str(&parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        assert_eq!(Rule::Required.check("").unwrap_err(), "This field is required");
        assert!(Rule::Required.check("  ").is_err());
        assert!(Rule::Required.check("x").is_ok());
    }

    #[test]
    fn test_optional_rules_pass_blank() {
        for rule in [Rule::Numeric, Rule::Phone, Rule::Email, Rule::NationalId] {
            assert!(rule.check("").is_ok());
        }
    }

    #[test]
    fn test_rate_range() {
        let rate = Rule::Range { min: 0.0, max: 100.0 };
        assert!(rate.check("0").is_ok());
        assert!(rate.check("100").is_ok());
        assert!(rate.check("15.5").is_ok());
        assert_eq!(rate.check("100.1").unwrap_err(), "Must be between 0 and 100");
        assert_eq!(rate.check("-1").unwrap_err(), "Must be between 0 and 100");
        assert_eq!(rate.check("ten").unwrap_err(), "Must be a number");
    }

    #[test]
    fn test_numeric_rejects_nan() {
        assert!(Rule::Numeric.check("NaN").is_err());
        assert!(Rule::Numeric.check("inf").is_err());
        assert!(Rule::Numeric.check("12.75").is_ok());
    }

    #[test]
    fn test_phone() {
        assert!(Rule::Phone.check("+263771234567").is_ok());
        assert!(Rule::Phone.check("0771 234 567").is_ok());
        assert!(Rule::Phone.check("077-123-4567").is_ok());
        assert!(Rule::Phone.check("12345").is_err());
        assert!(Rule::Phone.check("+2637712345678901").is_err());
        assert!(Rule::Phone.check("07712345ab").is_err());
    }

    #[test]
    fn test_national_id() {
        assert!(Rule::NationalId.check("63-123456A-12").is_ok());
        assert!(Rule::NationalId.check("631234567B45").is_ok());
        assert!(Rule::NationalId.check("63-12345-12").is_err());
    }

    #[test]
    fn test_non_ascii_digits_rejected() {
        assert!(Rule::Phone.check("٠٧٧١٢٣٤٥٦٧").is_err());
        assert!(Rule::NationalId.check("٦٣-١٢٣٤٥٦A-١٢").is_err());
    }

    #[test]
    fn test_email() {
        assert!(Rule::Email.check("ops@mine.co.zw").is_ok());
        assert!(Rule::Email.check("ops@mine").is_err());
    }

    #[test]
    fn test_first_failure_order() {
        let rules = [Rule::Required, Rule::Numeric];
        assert_eq!(first_failure(&rules, "").as_deref(), Some("This field is required"));
        assert_eq!(first_failure(&rules, "abc").as_deref(), Some("Must be a number"));
        assert_eq!(first_failure(&rules, "4"), None);
    }

    #[test]
    fn test_field_errors_display() {
        let mut errors = FieldErrors::new();
        errors.insert("taxRate", "Must be a number");
        errors.insert("location", "This field is required");
        assert_eq!(
            errors.to_string(),
            "location: This field is required; taxRate: Must be a number"
        );
    }
}
