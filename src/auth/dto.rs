use serde::{Deserialize, Serialize};

use crate::auth::repo::User;

/// Request body for `POST /users`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public part of a user, never carrying the password hash.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            avatar: user.avatar,
        }
    }
}

/// Response for a successful login.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: PublicUser,
    pub token: String,
}
