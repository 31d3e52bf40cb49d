// Input validation for ledger data
// Malformed values surface as ValidationError instead of being swallowed

use chrono::NaiveDate;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub context: String,
}

impl ValidationError {
    pub fn new(context: &str, field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
            context: context.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// FIELD CHECKS
// ============================================================================

/// Amounts must be real numbers; NaN and infinities are malformed data.
pub fn require_finite(context: &str, field: &str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::new(
            context,
            field,
            format!("Must be a finite number, got {}", value),
        ))
    }
}

/// Parse a textual amount such as "12.50" or "1,250.00".
pub fn parse_amount(context: &str, raw: &str) -> Result<f64, ValidationError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();

    if cleaned.is_empty() {
        return Err(ValidationError::new(context, "amount", "Required field is empty"));
    }

    let value = cleaned.parse::<f64>().map_err(|_| {
        ValidationError::new(context, "amount", format!("Not a number: '{}'", raw.trim()))
    })?;

    require_finite(context, "amount", value)
}

/// Dates are stored and matched as YYYY-MM-DD.
pub fn parse_date(context: &str, field: &str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ValidationError::new(
            context,
            field,
            format!("Expected YYYY-MM-DD, got '{}'", raw.trim()),
        )
    })
}

pub fn require_non_empty(context: &str, field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(context, field, "Required field is empty"))
    } else {
        Ok(())
    }
}

pub fn require_month(context: &str, month: u32) -> Result<u32, ValidationError> {
    if (1..=12).contains(&month) {
        Ok(month)
    } else {
        Err(ValidationError::new(
            context,
            "month",
            format!("Must be between 1 and 12, got {}", month),
        ))
    }
}

/// Collapse a list of field errors into the first one, keeping the count in the message.
pub fn first_error(mut errors: Vec<ValidationError>) -> Result<(), ValidationError> {
    if errors.is_empty() {
        return Ok(());
    }
    let extra = errors.len() - 1;
    let mut first = errors.remove(0);
    if extra > 0 {
        first.message = format!("{} (+{} more)", first.message, extra);
    }
    Err(first)
}
