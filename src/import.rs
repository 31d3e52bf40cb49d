// CSV import of expenses and incomes
//
// Expected header (aliases in parentheses):
//   label (category|source), amount, currency, date (expense_date|income_date),
//   notes, expense_type
// Only label, amount and date are required. Amounts may carry thousands separators.

use crate::ledger::RecordKind;
use crate::tracker::RecordInput;
use crate::validation::{parse_amount, parse_date, require_non_empty, ValidationError};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "category", alias = "source")]
    label: String,
    amount: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(alias = "expense_date", alias = "income_date")]
    date: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    expense_type: Option<String>,
}

impl CsvRow {
    fn into_input(self, kind: RecordKind) -> Result<RecordInput, ValidationError> {
        let context = kind.context();
        require_non_empty(context, "label", &self.label)?;

        Ok(RecordInput {
            amount: parse_amount(context, &self.amount)?,
            date: parse_date(context, "date", &self.date)?,
            label: self.label,
            currency: self.currency.filter(|c| !c.trim().is_empty()),
            notes: self.notes.filter(|n| !n.is_empty()),
            expense_type: self.expense_type.filter(|t| !t.is_empty()),
        })
    }
}

pub fn load_csv(csv_path: &Path, kind: RecordKind) -> Result<Vec<RecordInput>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;
    read_records(file, kind)
}

/// Parse every row; the first bad row aborts the whole file.
pub fn read_records<R: io::Read>(reader: R, kind: RecordKind) -> Result<Vec<RecordInput>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut inputs = Vec::new();
    for (index, result) in rdr.deserialize::<CsvRow>().enumerate() {
        // Line 1 is the header
        let line = index + 2;
        let row = result.with_context(|| format!("Failed to deserialize CSV line {}", line))?;
        let input = row
            .into_input(kind)
            .with_context(|| format!("Invalid {} on CSV line {}", kind.name(), line))?;
        inputs.push(input);
    }

    Ok(inputs)
}
