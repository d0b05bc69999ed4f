use sqlx::PgPool;

use crate::expenses::repo_types::{Expense, ExpenseFilter, NewExpense};
use crate::storage::{StoreError, StoreResult};

const COLUMNS: &str =
    "id, title, description, amount, category, user_id, created_at, updated_at";

// Shared by the row query and the sum so both see the same set.
// $1 owner, $2 category, $3 start, $4 end.
const FILTER: &str = r#"
    WHERE user_id = $1
      AND ($2::text IS NULL OR category = $2)
      AND ($3::timestamptz IS NULL OR created_at >= $3)
      AND ($4::timestamptz IS NULL OR created_at <= $4)
"#;

pub async fn insert(db: &PgPool, new: &NewExpense) -> StoreResult<Expense> {
    let sql = format!(
        "INSERT INTO expenses (title, description, amount, category, user_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
    );
    let expense = sqlx::query_as::<_, Expense>(&sql)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.amount)
        .bind(&new.category)
        .bind(new.user_id)
        .fetch_one(db)
        .await?;
    Ok(expense)
}

pub async fn get(db: &PgPool, id: i64) -> StoreResult<Expense> {
    let sql = format!("SELECT {COLUMNS} FROM expenses WHERE id = $1");
    sqlx::query_as::<_, Expense>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound)
}

/// Overwrites every mutable column of the row with `expense.id`.
pub async fn save(db: &PgPool, expense: &Expense) -> StoreResult<Expense> {
    let sql = format!(
        "UPDATE expenses \
         SET title = $2, description = $3, amount = $4, category = $5, user_id = $6, \
             updated_at = now() \
         WHERE id = $1 RETURNING {COLUMNS}"
    );
    sqlx::query_as::<_, Expense>(&sql)
        .bind(expense.id)
        .bind(&expense.title)
        .bind(&expense.description)
        .bind(expense.amount)
        .bind(&expense.category)
        .bind(expense.user_id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound)
}

/// Returns the number of rows removed; zero is not an error.
pub async fn delete(db: &PgPool, id: i64, owner_id: i64) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM expenses WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list_with_total(
    db: &PgPool,
    owner_id: i64,
    filter: &ExpenseFilter,
) -> StoreResult<(Vec<Expense>, f64)> {
    let rows_sql = format!("SELECT {COLUMNS} FROM expenses {FILTER} ORDER BY id DESC");
    let rows = sqlx::query_as::<_, Expense>(&rows_sql)
        .bind(owner_id)
        .bind(filter.category.as_deref())
        .bind(filter.start)
        .bind(filter.end)
        .fetch_all(db)
        .await?;

    let total_sql = format!("SELECT COALESCE(SUM(amount), 0)::float8 FROM expenses {FILTER}");
    let total = sqlx::query_scalar::<_, f64>(&total_sql)
        .bind(owner_id)
        .bind(filter.category.as_deref())
        .bind(filter.start)
        .bind(filter.end)
        .fetch_one(db)
        .await?;

    Ok((rows, total))
}
