use crate::error::VfsError;
use crate::utils::session::User;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Claims {
    pub fn into_user(self) -> User {
        User {
            username: self.sub,
            groups: self.groups,
        }
    }
}

pub fn encode(secret: &str, claims: &Claims) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn decode(secret: &str, token: &str) -> Result<Claims, VfsError> {
    Ok(jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| VfsError::Unauthenticated(e.to_string()))?
    .claims)
}

pub fn gen_token(secret: &str, lifetime_secs: i64, user: &User) -> String {
    let claims = Claims {
        sub: user.username.clone(),
        exp: (Utc::now() + Duration::seconds(lifetime_secs)).timestamp(),
        groups: user.groups.clone(),
    };
    encode(secret, &claims)
}
