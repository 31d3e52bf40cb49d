// Per-user currency settings

use crate::currency::{ConversionMode, Currency};
use crate::validation::{first_error, ValidationError};
use serde::{Deserialize, Serialize};

/// Signup category that defaults a new user to INR
pub const INR_SIGNUP_CATEGORY: &str = "Milky";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCurrencySettings {
    pub owner_id: i64,
    #[serde(rename = "currency")]
    pub display_currency: Currency,
    pub usd_to_inr_rate: f64,
}

impl UserCurrencySettings {
    /// Settings synthesised for a user who has none stored yet
    pub fn default_for(owner_id: i64, signup_category: &str, default_rate: f64) -> Self {
        UserCurrencySettings {
            owner_id,
            display_currency: default_display_currency(signup_category),
            usd_to_inr_rate: default_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if !self.display_currency.is_supported() {
            errors.push(ValidationError::new(
                "Settings",
                "currency",
                format!("Must be USD or INR, got {}", self.display_currency),
            ));
        }

        if !self.usd_to_inr_rate.is_finite() || self.usd_to_inr_rate <= 0.0 {
            errors.push(ValidationError::new(
                "Settings",
                "usd_to_inr_rate",
                format!("Must be a positive number, got {}", self.usd_to_inr_rate),
            ));
        }

        first_error(errors)
    }

    /// Express a stored amount in this user's display currency.
    pub fn to_display(&self, amount: f64, stored: &Currency, mode: ConversionMode) -> f64 {
        mode.to_display(amount, stored, &self.display_currency, self.usd_to_inr_rate)
    }
}

pub fn default_display_currency(signup_category: &str) -> Currency {
    if signup_category == INR_SIGNUP_CATEGORY {
        Currency::Inr
    } else {
        Currency::Usd
    }
}
