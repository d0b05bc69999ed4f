use sqlx::PgPool;

use crate::auth::repo_types::{NewUser, User};
use crate::storage::{StoreError, StoreResult};

/// Insert a new user. A duplicate email surfaces as a constraint error.
pub async fn create_user(db: &PgPool, new: &NewUser) -> StoreResult<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id, name, email, password_hash, created_at, updated_at
        "#,
    )
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.password_hash)
    .fetch_one(db)
    .await?;
    Ok(user)
}

/// Find the first user with exactly this email.
pub async fn find_by_email(db: &PgPool, email: &str) -> StoreResult<User> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password_hash, created_at, updated_at
        FROM users
        WHERE email = $1
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(email)
    .fetch_optional(db)
    .await?
    .ok_or(StoreError::NotFound)
}
