// Activity Feed Builder
// Most-recent-first merge of expenses and incomes, in the display currency

use crate::currency::{ConversionMode, Currency};
use crate::ledger::{MonetaryRecord, RecordKind};
use crate::settings::UserCurrencySettings;
use crate::validation::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FEED_LIMIT: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(rename = "title")]
    pub label: String,
    pub amount: f64,
    #[serde(rename = "date")]
    pub occurred_on: NaiveDate,
    pub notes: Option<String>,
    pub currency: Currency,
}

impl ActivityEntry {
    fn from_record(
        record: &MonetaryRecord,
        settings: &UserCurrencySettings,
        mode: ConversionMode,
    ) -> Result<Self, ValidationError> {
        Ok(ActivityEntry {
            id: record.id,
            kind: record.kind,
            label: record.label.clone(),
            amount: record.display_amount(settings, mode)?,
            occurred_on: record.occurred_on,
            notes: record.notes.clone(),
            currency: settings.display_currency.clone(),
        })
    }
}

/// Build the recent-activity feed.
///
/// Entries are ordered by date, newest first. The sort is stable over
/// `expenses` followed by `incomes`, so on equal dates expenses come first
/// and each side keeps its input order. At most `limit` entries are
/// returned; a non-positive limit yields nothing.
pub fn build_feed(
    expenses: &[MonetaryRecord],
    incomes: &[MonetaryRecord],
    settings: &UserCurrencySettings,
    mode: ConversionMode,
    limit: i64,
) -> Result<Vec<ActivityEntry>, ValidationError> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let mut entries = expenses
        .iter()
        .chain(incomes.iter())
        .map(|record| ActivityEntry::from_record(record, settings, mode))
        .collect::<Result<Vec<_>, _>>()?;

    entries.sort_by(|a, b| b.occurred_on.cmp(&a.occurred_on));
    entries.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

    Ok(entries)
}
