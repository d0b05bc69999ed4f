use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Expense row. Serialized as-is in API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub user_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub title: String,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub user_id: i64,
}

/// Optional predicates for listing. `None` means the bound is not applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseFilter {
    pub category: Option<String>,
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        self.category
            .as_deref()
            .map_or(true, |c| expense.category == c)
            && self.start.map_or(true, |s| expense.created_at >= s)
            && self.end.map_or(true, |e| expense.created_at <= e)
    }
}
