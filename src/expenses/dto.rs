use serde::{Deserialize, Serialize};

use super::repo_types::Expense;

/// Body for create and update.
#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub category: String,
}

/// List parameters: `dateStart`, `dateEnd`, `filterType`, `category`.
#[derive(Debug, Default, PartialEq)]
pub struct ListExpensesQuery {
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub filter_type: Option<String>,
    pub category: Option<String>,
}

impl ListExpensesQuery {
    /// First occurrence of a key wins; unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "dateStart" => &mut query.date_start,
                "dateEnd" => &mut query.date_end,
                "filterType" => &mut query.filter_type,
                "category" => &mut query.category,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListExpensesResponse {
    pub data: Vec<Expense>,
    pub total: f64,
}
