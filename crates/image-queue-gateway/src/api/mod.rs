mod auth;
mod error;
mod rest;

pub use auth::AuthUser;
pub use error::ApiError;
pub use rest::create_router;
