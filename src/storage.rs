use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::auth::{
    repo as user_repo,
    repo_types::{NewUser, User},
};
use crate::expenses::{
    repo as expense_repo,
    repo_types::{Expense, ExpenseFilter, NewExpense},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if matches!(e, sqlx::Error::RowNotFound) {
            return StoreError::NotFound;
        }
        if let Some(name) = e.as_database_error().and_then(|d| d.constraint()) {
            return StoreError::Constraint(name.to_string());
        }
        StoreError::Database(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Data access for users and their expenses.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    async fn get_user(&self, email: &str) -> StoreResult<User>;
    async fn create_expense(&self, new: NewExpense) -> StoreResult<Expense>;
    async fn get_expense(&self, id: i64) -> StoreResult<Expense>;
    async fn update_expense(&self, expense: Expense) -> StoreResult<Expense>;
    /// Deletes by id and owner; returns how many rows went away.
    async fn delete_expense(&self, id: i64, owner_id: i64) -> StoreResult<u64>;
    /// Matching rows newest id first, plus the sum of their amounts.
    async fn list_expenses(
        &self,
        owner_id: i64,
        filter: &ExpenseFilter,
    ) -> StoreResult<(Vec<Expense>, f64)>;
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self, new))]
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        user_repo::create_user(&self.db, &new).await
    }

    #[instrument(skip(self))]
    async fn get_user(&self, email: &str) -> StoreResult<User> {
        user_repo::find_by_email(&self.db, email).await
    }

    #[instrument(skip(self, new))]
    async fn create_expense(&self, new: NewExpense) -> StoreResult<Expense> {
        expense_repo::insert(&self.db, &new).await
    }

    #[instrument(skip(self))]
    async fn get_expense(&self, id: i64) -> StoreResult<Expense> {
        expense_repo::get(&self.db, id).await
    }

    #[instrument(skip(self, expense))]
    async fn update_expense(&self, expense: Expense) -> StoreResult<Expense> {
        expense_repo::save(&self.db, &expense).await
    }

    #[instrument(skip(self))]
    async fn delete_expense(&self, id: i64, owner_id: i64) -> StoreResult<u64> {
        expense_repo::delete(&self.db, id, owner_id).await
    }

    #[instrument(skip(self))]
    async fn list_expenses(
        &self,
        owner_id: i64,
        filter: &ExpenseFilter,
    ) -> StoreResult<(Vec<Expense>, f64)> {
        expense_repo::list_with_total(&self.db, owner_id, filter).await
    }
}

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    expenses: BTreeMap<i64, Expense>,
    next_user_id: i64,
    next_expense_id: i64,
}

/// In-process store with the same semantics as the postgres one.
/// Data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == new.email) {
            return Err(StoreError::Constraint("users_email_key".into()));
        }
        state.next_user_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: state.next_user_id,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, email: &str) -> StoreResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_expense(&self, new: NewExpense) -> StoreResult<Expense> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&new.user_id) {
            return Err(StoreError::Constraint("expenses_user_id_fkey".into()));
        }
        state.next_expense_id += 1;
        let now = OffsetDateTime::now_utc();
        let expense = Expense {
            id: state.next_expense_id,
            title: new.title,
            description: new.description,
            amount: new.amount,
            category: new.category,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
        };
        state.expenses.insert(expense.id, expense.clone());
        Ok(expense)
    }

    async fn get_expense(&self, id: i64) -> StoreResult<Expense> {
        let state = self.state.lock().await;
        state.expenses.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_expense(&self, expense: Expense) -> StoreResult<Expense> {
        let mut state = self.state.lock().await;
        let stored = state
            .expenses
            .get_mut(&expense.id)
            .ok_or(StoreError::NotFound)?;
        stored.title = expense.title;
        stored.description = expense.description;
        stored.amount = expense.amount;
        stored.category = expense.category;
        stored.user_id = expense.user_id;
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(stored.clone())
    }

    async fn delete_expense(&self, id: i64, owner_id: i64) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let owned = state
            .expenses
            .get(&id)
            .is_some_and(|e| e.user_id == owner_id);
        if !owned {
            return Ok(0);
        }
        state.expenses.remove(&id);
        Ok(1)
    }

    async fn list_expenses(
        &self,
        owner_id: i64,
        filter: &ExpenseFilter,
    ) -> StoreResult<(Vec<Expense>, f64)> {
        let state = self.state.lock().await;
        let rows: Vec<Expense> = state
            .expenses
            .values()
            .rev()
            .filter(|e| e.user_id == owner_id && filter.matches(e))
            .cloned()
            .collect();
        let total = rows.iter().map(|e| e.amount).sum();
        Ok((rows, total))
    }
}
