use serde::{Deserialize, Serialize};

/// Caller identity resolved by the auth middleware
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // owner id
    pub exp: usize,
    pub iat: usize,
}
