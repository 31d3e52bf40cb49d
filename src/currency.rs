//! Currency conversion policy for the USD/INR pair.
//!
//! Conversion is a pure function of the amount, the two currency codes and
//! the user's `usd_to_inr_rate`. Codes outside the pair pass through
//! unconverted rather than failing.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Currency {
    #[default]
    Usd,
    Inr,
    /// A code we carry but never convert
    Other(String),
}

impl Currency {
    pub fn code(&self) -> &str {
        match self {
            Currency::Usd => "USD",
            Currency::Inr => "INR",
            Currency::Other(code) => code,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Currency::Usd => "$",
            Currency::Inr => "₹",
            Currency::Other(code) => code,
        }
    }

    /// USD and INR are the only currencies a user may display in.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Currency::Other(_))
    }

    /// Parse an optional upstream code; absent or blank means USD.
    pub fn from_optional(code: Option<&str>) -> Currency {
        code.map(Currency::from).unwrap_or(Currency::Usd)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        let code = code.trim();
        match code.to_ascii_uppercase().as_str() {
            "" | "USD" => Currency::Usd,
            "INR" => Currency::Inr,
            other => Currency::Other(other.to_string()),
        }
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        Currency::from(code.as_str())
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Convert `amount` from one currency to another using a USD→INR `rate`.
pub fn convert(amount: f64, from: &Currency, to: &Currency, rate: f64) -> f64 {
    if from == to {
        return amount;
    }

    match (from, to) {
        (Currency::Usd, Currency::Inr) => amount * rate,
        (Currency::Inr, Currency::Usd) => amount / rate,
        _ => amount,
    }
}

/// How stored amounts relate to the currency they were entered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    /// Records keep their entry currency; convert only when it differs
    /// from the display currency.
    #[default]
    Smart,
    /// Every stored amount is USD; convert USD → display on every read.
    AlwaysNormalize,
}

impl ConversionMode {
    pub fn name(&self) -> &str {
        match self {
            ConversionMode::Smart => "smart",
            ConversionMode::AlwaysNormalize => "always_normalize",
        }
    }

    /// Amount of a stored record expressed in `display`.
    pub fn to_display(&self, amount: f64, stored: &Currency, display: &Currency, rate: f64) -> f64 {
        match self {
            ConversionMode::Smart => convert(amount, stored, display, rate),
            ConversionMode::AlwaysNormalize => convert(amount, &Currency::Usd, display, rate),
        }
    }

    /// Amount and currency tag to persist for a newly entered record.
    pub fn for_storage(&self, amount: f64, entered: Currency, rate: f64) -> (f64, Currency) {
        match self {
            ConversionMode::Smart => (amount, entered),
            ConversionMode::AlwaysNormalize => {
                (convert(amount, &entered, &Currency::Usd, rate), Currency::Usd)
            }
        }
    }
}
