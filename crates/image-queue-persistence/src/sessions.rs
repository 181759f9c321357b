use crate::{PersistenceError, Result, SessionRepository};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use image_queue_core::UserId;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// Claims carried by a persistent session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: String,
    pub exp: usize,
}

/// Signs and checks HS256 session tokens
struct TokenIssuer {
    secret: Vec<u8>,
    ttl_secs: u64,
}

impl TokenIssuer {
    fn new(secret: &[u8], ttl_secs: u64) -> Self {
        TokenIssuer {
            secret: secret.to_vec(),
            ttl_secs,
        }
    }

    fn issue(&self, user_id: UserId) -> Result<String> {
        let exp = (Utc::now() + Duration::seconds(self.ttl_secs as i64)).timestamp() as usize;
        let claims = SessionClaims {
            user_id: user_id.to_string(),
            exp,
        };
        Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))?)
    }

    fn verify(&self, token: &str) -> Result<SessionClaims> {
        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| PersistenceError::InvalidSession)?;
        Ok(data.claims)
    }
}

/// Sessions in Redis: the signed token is the key, the user id the value,
/// and the key expires after the session TTL.
pub struct RedisSessionRepository {
    connection: MultiplexedConnection,
    tokens: TokenIssuer,
}

impl RedisSessionRepository {
    pub async fn connect(redis_url: &str, jwt_secret: &str, ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut connection = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut connection).await?;
        info!("Connected to session store at {}", redis_url);

        Ok(RedisSessionRepository {
            connection,
            tokens: TokenIssuer::new(jwt_secret.as_bytes(), ttl_secs),
        })
    }
}

#[async_trait]
impl SessionRepository for RedisSessionRepository {
    async fn create_session(&self, user_id: UserId) -> Result<String> {
        let token = self.tokens.issue(user_id)?;
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(&token)
            .arg(user_id.to_string())
            .arg("EX")
            .arg(self.tokens.ttl_secs)
            .query_async::<()>(&mut conn)
            .await?;
        debug!(user_id = %user_id, "Created session");
        Ok(token)
    }

    async fn resolve_session(&self, token: &str) -> Result<UserId> {
        // Reject forged or stale tokens before the round trip
        self.tokens.verify(token)?;

        let mut conn = self.connection.clone();
        let stored: Option<String> = redis::cmd("GET").arg(token).query_async(&mut conn).await?;
        let user_id = stored.ok_or(PersistenceError::InvalidSession)?;
        Uuid::parse_str(&user_id)
            .map_err(|_| PersistenceError::Other("invalid user ID format".to_string()))
    }
}

/// In-process sessions with an optional lifetime
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<String, (UserId, Option<DateTime<Utc>>)>>,
    ttl: Option<Duration>,
}

impl MemorySessionRepository {
    pub fn unbounded() -> Self {
        MemorySessionRepository {
            sessions: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }

    pub fn with_ttl(ttl_secs: u64) -> Self {
        MemorySessionRepository {
            sessions: RwLock::new(HashMap::new()),
            ttl: Some(Duration::seconds(ttl_secs as i64)),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create_session(&self, user_id: UserId) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let expires_at = self.ttl.map(|ttl| Utc::now() + ttl);
        self.sessions.write().insert(token.clone(), (user_id, expires_at));
        Ok(token)
    }

    async fn resolve_session(&self, token: &str) -> Result<UserId> {
        let entry = self.sessions.read().get(token).copied();
        match entry {
            Some((user_id, None)) => Ok(user_id),
            Some((user_id, Some(expires_at))) if expires_at > Utc::now() => Ok(user_id),
            Some(_) => {
                self.sessions.write().remove(token);
                Err(PersistenceError::InvalidSession)
            }
            None => Err(PersistenceError::InvalidSession),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let issuer = TokenIssuer::new(b"secret", DEFAULT_SESSION_TTL_SECS);
        let user_id = Uuid::new_v4();

        let token = issuer.issue(user_id).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.user_id, user_id.to_string());
        assert!(claims.exp as i64 > Utc::now().timestamp());
    }

    #[test]
    fn test_token_rejected_with_other_secret() {
        let token = TokenIssuer::new(b"secret", 60).issue(Uuid::new_v4()).unwrap();
        let other = TokenIssuer::new(b"different", 60);
        assert!(matches!(other.verify(&token), Err(PersistenceError::InvalidSession)));
        assert!(other.verify("not-a-jwt").is_err());
    }

    #[tokio::test]
    async fn test_memory_sessions() {
        let repo = MemorySessionRepository::unbounded();
        let user_id = Uuid::new_v4();
        let first = repo.create_session(user_id).await.unwrap();
        let second = repo.create_session(user_id).await.unwrap();

        assert_eq!(repo.resolve_session(&first).await.unwrap(), user_id);
        assert_eq!(repo.resolve_session(&second).await.unwrap(), user_id);
        assert_eq!(repo.len(), 2);
        assert!(repo.resolve_session("unknown").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_sessions_expire() {
        let repo = MemorySessionRepository::with_ttl(0);
        let token = repo.create_session(Uuid::new_v4()).await.unwrap();

        assert!(matches!(
            repo.resolve_session(&token).await,
            Err(PersistenceError::InvalidSession)
        ));
        assert!(repo.is_empty());
    }
}
