pub mod auth;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod password;

/// Cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
