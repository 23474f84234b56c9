//! Users endpoint
//!
//! Serves a fixed in-memory user list; there is no account system yet.

use axum::Json;
use serde::Serialize;

#[derive(Serialize, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub role: String,
}

/// GET /api/v1/users - List all users (dummy data)
pub async fn list_users() -> Json<Vec<User>> {
    Json(vec![
        User {
            id: 1,
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            role: "admin".to_string(),
        },
        User {
            id: 2,
            username: "user1".to_string(),
            email: "user1@example.com".to_string(),
            role: "user".to_string(),
        },
        User {
            id: 3,
            username: "user2".to_string(),
            email: "user2@example.com".to_string(),
            role: "user".to_string(),
        },
    ])
}
