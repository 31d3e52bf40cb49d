// Monthly saving plans

use crate::validation::{first_error, require_month, require_non_empty, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingPlan {
    pub id: i64,
    pub user_id: i64,
    pub category: String,
    pub amount: f64,
    pub month: u32,
    pub year: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSavingPlan {
    pub category: String,
    pub amount: f64,
    pub month: u32,
    pub year: i32,
}

impl NewSavingPlan {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = require_non_empty("SavingPlan", "category", &self.category) {
            errors.push(e);
        }
        if !self.amount.is_finite() {
            errors.push(ValidationError::new(
                "SavingPlan",
                "amount",
                format!("Must be a finite number, got {}", self.amount),
            ));
        }
        if let Err(e) = require_month("SavingPlan", self.month) {
            errors.push(e);
        }

        first_error(errors)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingPlanSummary {
    pub month: u32,
    pub year: i32,
    pub total_planned: f64,
    pub count: usize,
}

/// Total planned savings for one month. Plans from other months are ignored.
pub fn summarize_plans(month: u32, year: i32, plans: &[SavingPlan]) -> SavingPlanSummary {
    let matching: Vec<&SavingPlan> = plans
        .iter()
        .filter(|p| p.month == month && p.year == year)
        .collect();

    SavingPlanSummary {
        month,
        year,
        total_planned: matching.iter().map(|p| p.amount).sum(),
        count: matching.len(),
    }
}
