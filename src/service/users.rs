//! Mock user lookups.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use opentelemetry::{Context, KeyValue};
use serde::Serialize;

use super::simulator::Operation;
use super::{error_body, request_context, AppState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    fn new(id: u32, name: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub count: usize,
}

/// Fixed user catalog, created `1..=3` days before `now`.
pub fn mock_users(now: DateTime<Utc>) -> Vec<User> {
    ["Alice", "Bob", "Charlie"]
        .into_iter()
        .zip(1..)
        .map(|(name, id)| User::new(id, name, now - Duration::days(i64::from(id))))
        .collect()
}

async fn fetch_users(state: &AppState, parent: &Context) -> Vec<User> {
    let span = state.child_span("fetchUsers", parent);
    state.simulator.simulate(Operation::FetchUsers).await;

    let users = mock_users(Utc::now());
    span.set_attribute(KeyValue::new("db.rows_returned", users.len() as i64));
    users
}

async fn fetch_user_by_id(state: &AppState, parent: &Context, id: &str) -> Option<User> {
    let span = state.child_span("fetchUserByID", parent);
    span.set_attribute(KeyValue::new("db.query_id", id.to_string()));
    state.simulator.simulate(Operation::FetchUser).await;

    // Ids are matched as written: "01" is not user 1.
    let now = Utc::now();
    mock_users(now)
        .into_iter()
        .find(|user| user.id.to_string() == id)
        .map(|user| User {
            created_at: now,
            ..user
        })
}

/// `GET /api/users`
pub async fn list_users(
    State(state): State<AppState>,
    parent: Option<Extension<Context>>,
) -> Json<UserList> {
    let parent = request_context(parent);
    let span = state.child_span("getUsersHandler", &parent);

    let users = fetch_users(&state, span.context()).await;
    span.set_attribute(KeyValue::new("user_count", users.len() as i64));

    Json(UserList {
        count: users.len(),
        users,
    })
}

/// `GET /api/users/:id`
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    parent: Option<Extension<Context>>,
) -> Response {
    let parent = request_context(parent);
    let span = state.child_span("getUserHandler", &parent);
    span.set_attribute(KeyValue::new("user_id", id.clone()));

    match fetch_user_by_id(&state, span.context(), &id).await {
        Some(user) => Json(user).into_response(),
        None => {
            tracing::debug!(user_id = %id, "User not found");
            error_body(StatusCode::NOT_FOUND, "User not found").into_response()
        }
    }
}
