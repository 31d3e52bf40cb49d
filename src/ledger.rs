// Ledger Aggregator
// Folds a period's expenses and incomes into one summary in the display currency

use crate::currency::{ConversionMode, Currency};
use crate::settings::UserCurrencySettings;
use crate::validation::{require_finite, ValidationError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Expense,
    Income,
}

impl RecordKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Expense => "expense",
            RecordKind::Income => "income",
        }
    }

    /// Context label used in validation errors
    pub fn context(&self) -> &'static str {
        match self {
            RecordKind::Expense => "Expense",
            RecordKind::Income => "Income",
        }
    }
}

/// An expense or income as persisted, amount in its stored currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryRecord {
    pub id: i64,
    pub owner_id: i64,
    pub kind: RecordKind,
    pub amount: f64,
    #[serde(default)]
    pub currency: Currency,
    /// Category for expenses, source for incomes
    pub label: String,
    pub occurred_on: NaiveDate,
    pub notes: Option<String>,
    /// "regular" or "additional"; expenses only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expense_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl MonetaryRecord {
    /// Amount in the settings' display currency, rejecting malformed numbers
    pub fn display_amount(
        &self,
        settings: &UserCurrencySettings,
        mode: ConversionMode,
    ) -> Result<f64, ValidationError> {
        let amount = require_finite(self.kind.context(), "amount", self.amount)?;
        Ok(settings.to_display(amount, &self.currency, mode))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub total_income: f64,
    pub total_expense: f64,
    pub savings: f64,
    pub currency: Currency,
}

impl PeriodSummary {
    pub fn empty(currency: Currency) -> Self {
        PeriodSummary {
            total_income: 0.0,
            total_expense: 0.0,
            savings: 0.0,
            currency,
        }
    }
}

/// Sum a period's records in the display currency.
///
/// Records must already be filtered to the period. Each record is converted
/// on its own before accumulating, so mixed-currency input is fine.
pub fn summarize(
    records: &[MonetaryRecord],
    settings: &UserCurrencySettings,
    mode: ConversionMode,
) -> Result<PeriodSummary, ValidationError> {
    let mut total_income = 0.0;
    let mut total_expense = 0.0;

    for record in records {
        let amount = record.display_amount(settings, mode)?;
        match record.kind {
            RecordKind::Expense => total_expense += amount,
            RecordKind::Income => total_income += amount,
        }
    }

    Ok(PeriodSummary {
        total_income,
        total_expense,
        savings: total_income - total_expense,
        currency: settings.display_currency.clone(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(
        id: i64,
        kind: RecordKind,
        amount: f64,
        currency: Currency,
        date: &str,
    ) -> MonetaryRecord {
        MonetaryRecord {
            id,
            owner_id: 1,
            kind,
            amount,
            currency,
            label: match kind {
                RecordKind::Expense => "Food".to_string(),
                RecordKind::Income => "Salary".to_string(),
            },
            occurred_on: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            notes: None,
            expense_type: None,
            created_at: None,
        }
    }

    fn settings(currency: Currency, rate: f64) -> UserCurrencySettings {
        UserCurrencySettings {
            owner_id: 1,
            display_currency: currency,
            usd_to_inr_rate: rate,
        }
    }

    #[test]
    fn test_empty_records_are_zero() {
        for currency in [Currency::Usd, Currency::Inr] {
            let summary = summarize(&[], &settings(currency.clone(), 83.0), ConversionMode::Smart).unwrap();
            assert_eq!(summary, PeriodSummary::empty(currency));
        }
    }

    #[test]
    fn test_usd_summary() {
        let records = vec![
            record(1, RecordKind::Expense, 100.0, Currency::Usd, "2024-05-02"),
            record(2, RecordKind::Income, 50.0, Currency::Usd, "2024-05-03"),
        ];

        let summary = summarize(&records, &settings(Currency::Usd, 80.0), ConversionMode::Smart).unwrap();

        assert_eq!(summary.total_income, 50.0);
        assert_eq!(summary.total_expense, 100.0);
        assert_eq!(summary.savings, -50.0);
        assert_eq!(summary.currency, Currency::Usd);
    }

    #[test]
    fn test_inr_display_converts_usd_records() {
        let records = vec![
            record(1, RecordKind::Expense, 100.0, Currency::Usd, "2024-05-02"),
            record(2, RecordKind::Income, 50.0, Currency::Usd, "2024-05-03"),
        ];

        let summary = summarize(&records, &settings(Currency::Inr, 80.0), ConversionMode::Smart).unwrap();

        assert_eq!(summary.total_expense, 8000.0);
        assert_eq!(summary.total_income, 4000.0);
        assert_eq!(summary.savings, -4000.0);
        assert_eq!(summary.currency, Currency::Inr);
    }

    #[test]
    fn test_mixed_currency_smart_mode() {
        let records = vec![
            record(1, RecordKind::Expense, 500.0, Currency::Inr, "2024-05-02"),
            record(2, RecordKind::Expense, 10.0, Currency::Usd, "2024-05-02"),
            record(3, RecordKind::Income, 20.0, Currency::from("EUR"), "2024-05-04"),
        ];

        let summary = summarize(&records, &settings(Currency::Usd, 80.0), ConversionMode::Smart).unwrap();

        assert_eq!(summary.total_expense, 16.25);
        // Unsupported code is passed through as-is
        assert_eq!(summary.total_income, 20.0);
    }

    #[test]
    fn test_always_normalize_ignores_entry_currency() {
        let records = vec![record(1, RecordKind::Expense, 10.0, Currency::Inr, "2024-05-02")];

        let summary = summarize(
            &records,
            &settings(Currency::Inr, 80.0),
            ConversionMode::AlwaysNormalize,
        )
        .unwrap();

        assert_eq!(summary.total_expense, 800.0);
    }

    #[test]
    fn test_malformed_amount_is_validation_error() {
        let records = vec![
            record(1, RecordKind::Income, 10.0, Currency::Usd, "2024-05-02"),
            record(2, RecordKind::Expense, f64::NAN, Currency::Usd, "2024-05-02"),
        ];

        let err = summarize(&records, &settings(Currency::Usd, 80.0), ConversionMode::Smart).unwrap_err();
        assert_eq!(err.context, "Expense");
        assert_eq!(err.field, "amount");
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let json = serde_json::to_value(PeriodSummary::empty(Currency::Inr)).unwrap();
        assert_eq!(json["totalIncome"], 0.0);
        assert_eq!(json["totalExpense"], 0.0);
        assert_eq!(json["currency"], "INR");
    }
}
