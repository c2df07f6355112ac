use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Teacher => "Teacher",
            Role::Parent => "Parent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub key: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub jti: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtSettings {
    pub fn issue(&self, id: i64, email: &str, role: Role) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.key.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.key.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// Accepts bcrypt hashes and the unsalted SHA-256 hex digests older accounts carry.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.is_empty() {
        return false;
    }
    if stored.starts_with("$2") {
        return bcrypt::verify(password, stored).unwrap_or(false);
    }
    legacy_sha256_hex(password).eq_ignore_ascii_case(stored)
}

pub fn legacy_sha256_hex(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> JwtSettings {
        JwtSettings {
            key: "test-signing-key-with-enough-length".to_string(),
            issuer: "TlinkyAuth".to_string(),
            audience: "TlinkyMobile".to_string(),
        }
    }

    #[test]
    fn issued_token_verifies_with_claims() {
        let s = settings();
        let token = s.issue(7, "t@tlinky.org", Role::Teacher).expect("issue");
        let claims = s.verify(&token).expect("verify");
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email, "t@tlinky.org");
        assert_eq!(claims.role, "Teacher");
        assert_eq!(claims.exp - claims.iat, TOKEN_LIFETIME_HOURS * 3600);
    }

    #[test]
    fn token_from_other_audience_is_rejected() {
        let token = settings().issue(1, "a@tlinky.org", Role::Admin).expect("issue");
        let mut other = settings();
        other.audience = "SomeoneElse".to_string();
        assert!(other.verify(&token).is_err());
        let mut other_key = settings();
        other_key.key = "a-completely-different-signing-key".to_string();
        assert!(other_key.verify(&token).is_err());
    }

    #[test]
    fn bcrypt_and_legacy_hashes_verify() {
        let hash = hash_password("1234").expect("hash");
        assert!(verify_password("1234", &hash));
        assert!(!verify_password("4321", &hash));

        let legacy = legacy_sha256_hex("secret");
        assert_eq!(
            legacy,
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
        assert!(verify_password("secret", &legacy));
        assert!(!verify_password("secret", ""));
    }
}
