use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// A registered account. The password is kept and compared as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: UserId,

    #[serde(rename = "username")]
    pub login: String,

    pub password: String,
}

impl User {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        User {
            id: Uuid::new_v4(),
            login: login.into(),
            password: password.into(),
        }
    }
}
