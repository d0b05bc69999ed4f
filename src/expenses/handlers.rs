use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use super::{
    dto::{ExpenseRequest, ListExpensesQuery, ListExpensesResponse},
    filter,
    repo_types::{Expense, NewExpense},
};
use crate::{
    auth::extractors::AuthUser, error::ApiError, state::AppState, storage::StoreError,
};

pub fn expense_routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/:id", put(update_expense).delete(delete_expense))
}

fn invalid_request(rejection: JsonRejection) -> ApiError {
    debug!(error = %rejection.body_text(), "rejected expense body");
    ApiError::bad_request("invalid request")
}

/// A segment that is not an integer cannot name a row, so callers treat it
/// like a missing expense.
fn expense_id(path: Result<Path<i64>, PathRejection>) -> Option<i64> {
    match path {
        Ok(Path(id)) => Some(id),
        Err(e) => {
            debug!(error = %e.body_text(), "non-numeric expense id");
            None
        }
    }
}

fn not_found(id: Option<i64>) -> ApiError {
    warn!(expense_id = ?id, "expense not found");
    ApiError::NotFound("expense not found".into())
}

fn validate(body: &ExpenseRequest) -> Result<(), ApiError> {
    if body.title.trim().is_empty() || !body.amount.is_finite() {
        return Err(ApiError::bad_request("invalid request"));
    }
    Ok(())
}

fn server_error(e: StoreError) -> ApiError {
    error!(error = %e, "expense storage failed");
    ApiError::internal("server error")
}

#[instrument(skip(state, claims, payload), fields(user_id = claims.user_id))]
pub async fn create_expense(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<ExpenseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let Json(body) = payload.map_err(invalid_request)?;
    validate(&body)?;

    let expense = state
        .store
        .create_expense(NewExpense {
            title: body.title,
            description: body.description,
            amount: body.amount,
            category: body.category,
            user_id: claims.user_id,
        })
        .await
        .map_err(server_error)?;

    info!(expense_id = expense.id, "expense created");
    Ok((StatusCode::CREATED, Json(expense)))
}

/// Overwrites description, amount and category of an owned expense.
/// Answers 201 for compatibility with existing clients.
#[instrument(skip(state, claims, path, payload), fields(user_id = claims.user_id))]
pub async fn update_expense(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ExpenseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let id = expense_id(path);
    let Json(body) = payload.map_err(invalid_request)?;
    validate(&body)?;
    let Some(id) = id else {
        return Err(not_found(None));
    };

    let mut expense = match state.store.get_expense(id).await {
        Ok(e) => e,
        Err(StoreError::NotFound) => return Err(not_found(Some(id))),
        Err(e) => return Err(server_error(e)),
    };

    if expense.user_id != claims.user_id {
        warn!(expense_id = id, owner_id = expense.user_id, "update of foreign expense");
        return Err(ApiError::Forbidden("Forbidden".into()));
    }

    expense.description = body.description;
    expense.amount = body.amount;
    expense.category = body.category;
    expense.user_id = claims.user_id;

    let updated = state.store.update_expense(expense).await.map_err(server_error)?;

    info!(expense_id = updated.id, "expense updated");
    Ok((StatusCode::CREATED, Json(updated)))
}

/// Idempotent: a missing, foreign or non-numeric id still answers 204.
#[instrument(skip(state, claims, path), fields(user_id = claims.user_id))]
pub async fn delete_expense(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Some(id) = expense_id(path) else {
        return Ok(StatusCode::NO_CONTENT);
    };
    let removed = state
        .store
        .delete_expense(id, claims.user_id)
        .await
        .map_err(server_error)?;

    if removed == 0 {
        debug!(expense_id = id, "delete matched no owned expense");
    } else {
        info!(expense_id = id, "expense deleted");
    }
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, claims, query), fields(user_id = claims.user_id))]
pub async fn list_expenses(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<ListExpensesResponse>, ApiError> {
    let Query(pairs) = query.map_err(|e| {
        debug!(error = %e.body_text(), "rejected list query");
        ApiError::bad_request("invalid request")
    })?;
    let query = ListExpensesQuery::from_pairs(pairs);
    let filter = filter::resolve(&query, OffsetDateTime::now_utc());
    let (data, total) = state
        .store
        .list_expenses(claims.user_id, &filter)
        .await
        .map_err(server_error)?;

    debug!(count = data.len(), total, "expenses listed");
    Ok(Json(ListExpensesResponse { data, total }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app::build_app,
        auth::{password::hash_password, repo_types::NewUser},
    };
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `oneshot`

    struct Harness {
        state: AppState,
        app: Router,
    }

    impl Harness {
        fn new() -> Self {
            let state = AppState::fake();
            let app = build_app(state.clone());
            Self { state, app }
        }

        async fn user(&self, email: &str) -> String {
            let user = self
                .state
                .store
                .create_user(NewUser {
                    name: "Test".into(),
                    email: email.into(),
                    password_hash: hash_password("pw").unwrap(),
                })
                .await
                .unwrap();
            self.state.keys.sign_access(user.id).unwrap()
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string())),
                None => builder.body(Body::empty()),
            }
            .unwrap();

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn create(&self, token: &str, title: &str, amount: f64, category: &str) -> Expense {
            let (status, body) = self
                .send(
                    "POST",
                    "/expenses",
                    Some(token),
                    Some(json!({"title": title, "amount": amount, "category": category})),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            serde_json::from_value(body).unwrap()
        }
    }

    #[tokio::test]
    async fn endpoints_require_access_token() {
        let h = Harness::new();
        let (status, body) = h.send("GET", "/expenses", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());

        let (status, _) = h.send("GET", "/expenses", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let refresh = h.state.keys.sign_refresh(1).unwrap();
        let (status, _) = h.send("GET", "/expenses", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_then_list_by_category() {
        let h = Harness::new();
        let token = h.user("a@x.com").await;

        let coffee = h.create(&token, "Coffee", 3.5, "food").await;
        assert!(coffee.id > 0);
        assert_eq!(coffee.title, "Coffee");
        assert_eq!(coffee.description, "");
        h.create(&token, "Bus", 2.0, "transport").await;

        let (status, body) = h
            .send("GET", "/expenses?category=food", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let list: ListExpensesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(list.data, vec![coffee]);
        assert_eq!(list.total, 3.5);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_totals_the_same_rows() {
        let h = Harness::new();
        let ann = h.user("a@x.com").await;
        let bob = h.user("b@x.com").await;
        let first = h.create(&ann, "Coffee", 3.5, "food").await;
        h.create(&bob, "Cinema", 9.0, "fun").await;
        let second = h.create(&ann, "Lunch", 12.0, "food").await;

        let (_, body) = h.send("GET", "/expenses", Some(&ann), None).await;
        let list: ListExpensesResponse = serde_json::from_value(body).unwrap();
        let ids: Vec<i64> = list.data.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(list.total, list.data.iter().map(|e| e.amount).sum::<f64>());

        let (_, body) = h
            .send("GET", "/expenses?filterType=lastWeek", Some(&ann), None)
            .await;
        let list: ListExpensesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(list.data.len(), 2);

        let (_, body) = h
            .send("GET", "/expenses?dateStart=2999-01-01", Some(&ann), None)
            .await;
        let list: ListExpensesResponse = serde_json::from_value(body).unwrap();
        assert!(list.data.is_empty());
        assert_eq!(list.total, 0.0);
    }

    #[tokio::test]
    async fn create_rejects_bad_body() {
        let h = Harness::new();
        let token = h.user("a@x.com").await;
        let (status, body) = h
            .send("POST", "/expenses", Some(&token), Some(json!({"title": "x"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "invalid request");

        let (status, _) = h
            .send(
                "POST",
                "/expenses",
                Some(&token),
                Some(json!({"title": " ", "amount": 1.0})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_answers_created() {
        let h = Harness::new();
        let token = h.user("a@x.com").await;
        let coffee = h.create(&token, "Coffee", 3.5, "food").await;

        let (status, body) = h
            .send(
                "PUT",
                &format!("/expenses/{}", coffee.id),
                Some(&token),
                Some(json!({
                    "title": "Espresso",
                    "description": "double",
                    "amount": 4.0,
                    "category": "drinks"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let updated: Expense = serde_json::from_value(body).unwrap();
        assert_eq!(updated.id, coffee.id);
        assert_eq!(updated.title, "Coffee");
        assert_eq!(updated.description, "double");
        assert_eq!(updated.amount, 4.0);
        assert_eq!(updated.category, "drinks");
        assert_eq!(updated.user_id, coffee.user_id);
    }

    #[tokio::test]
    async fn update_by_other_user_is_forbidden() {
        let h = Harness::new();
        let ann = h.user("a@x.com").await;
        let bob = h.user("b@x.com").await;
        let coffee = h.create(&ann, "Coffee", 3.5, "food").await;

        let (status, body) = h
            .send(
                "PUT",
                &format!("/expenses/{}", coffee.id),
                Some(&bob),
                Some(json!({"title": "Mine", "amount": 0.5, "category": "food"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Forbidden");
        assert_eq!(h.state.store.get_expense(coffee.id).await.unwrap(), coffee);
    }

    #[tokio::test]
    async fn update_of_missing_or_malformed_id() {
        let h = Harness::new();
        let token = h.user("a@x.com").await;
        let body = json!({"title": "x", "amount": 1.0});

        let (status, resp) = h
            .send("PUT", "/expenses/404", Some(&token), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(resp["message"], "expense not found");

        let (status, resp) = h
            .send("PUT", "/expenses/abc", Some(&token), Some(body))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(resp["message"], "expense not found");

        let (status, resp) = h
            .send("PUT", "/expenses/abc", Some(&token), Some(json!({"title": "x"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["message"], "invalid request");
    }

    #[tokio::test]
    async fn delete_removes_own_expense_and_ignores_foreign_ones() {
        let h = Harness::new();
        let ann = h.user("a@x.com").await;
        let bob = h.user("b@x.com").await;
        let coffee = h.create(&ann, "Coffee", 3.5, "food").await;
        let uri = format!("/expenses/{}", coffee.id);

        let (status, body) = h.send("DELETE", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
        assert!(h.state.store.get_expense(coffee.id).await.is_ok());

        let (status, _) = h.send("DELETE", &uri, Some(&ann), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(matches!(
            h.state.store.get_expense(coffee.id).await,
            Err(StoreError::NotFound)
        ));

        let (status, _) = h.send("DELETE", "/expenses/9999", Some(&ann), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = h.send("DELETE", "/expenses/abc", Some(&ann), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn repeated_query_keys_use_the_first_value() {
        let h = Harness::new();
        let token = h.user("a@x.com").await;
        let coffee = h.create(&token, "Coffee", 3.5, "food").await;
        h.create(&token, "Bus", 2.0, "transport").await;

        let (status, body) = h
            .send(
                "GET",
                "/expenses?category=food&category=transport&unknown=1",
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let list: ListExpensesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(list.data, vec![coffee]);
        assert_eq!(list.total, 3.5);
    }
}
