use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        jwt::JwtKeys,
        repo_types::User,
    },
    error::{AppError, Result},
};

pub(crate) const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

fn issue(keys: &JwtKeys, user: &User) -> Result<AuthResponse> {
    let token = keys.sign(user)?;
    Ok(AuthResponse {
        token,
        user: PublicUser::from(user),
    })
}

pub async fn register(db: &SqlitePool, keys: &JwtKeys, req: RegisterRequest) -> Result<AuthResponse> {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();

    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("All fields are required".into()));
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if User::find_by_email(db, &email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::Conflict("User with this email already exists".into()));
    }

    let hash = hash_password(&req.password)?;

    let user = match User::create(db, name, &email, &hash).await {
        Ok(u) => u,
        // Lost a race with a concurrent registration of the same email.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict("User with this email already exists".into()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    issue(keys, &user)
}

pub async fn login(db: &SqlitePool, keys: &JwtKeys, req: LoginRequest) -> Result<AuthResponse> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Email and password are required".into()));
    }

    let Some(user) = User::find_by_email(db, &email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    issue(keys, &user)
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse").expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("spaces in@mail.com"));
        assert!(!is_valid_email("user@localhost"));
    }
}

#[cfg(test)]
mod flow_tests {
    use super::*;
    use crate::{config::JwtConfig, db::memory_pool};

    fn keys() -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 60 * 24 * 7,
        })
    }

    fn register_req(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_issues_token_for_new_user() {
        let db = memory_pool().await;
        let keys = keys();
        let res = register(&db, &keys, register_req("Ivan", " Ivan@Example.com ", "secret1"))
            .await
            .unwrap();
        assert_eq!(res.user.email, "ivan@example.com");
        assert_eq!(res.user.name, "Ivan");
        let claims = keys.verify(&res.token).unwrap();
        assert_eq!(claims.sub, res.user.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let db = memory_pool().await;
        let keys = keys();
        register(&db, &keys, register_req("A", "dup@example.com", "secret1"))
            .await
            .unwrap();
        let err = register(&db, &keys, register_req("B", "DUP@example.com", "other-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let db = memory_pool().await;
        for pw in ["", "a", "12345", "абвгд"] {
            let err = register(&db, &keys(), register_req("A", "short@example.com", pw))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "password {pw:?}");
        }
        assert!(User::find_by_email(&db, "short@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let db = memory_pool().await;
        let err = register(&db, &keys(), register_req("  ", "x@example.com", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = login(
            &db,
            &keys(),
            LoginRequest {
                email: "x@example.com".into(),
                password: String::new(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn login_token_matches_stored_user() {
        let db = memory_pool().await;
        let keys = keys();
        register(&db, &keys, register_req("Olga", "olga@example.com", "secret1"))
            .await
            .unwrap();
        let stored = User::find_by_email(&db, "olga@example.com").await.unwrap().unwrap();

        let res = login(
            &db,
            &keys,
            LoginRequest {
                email: "OLGA@example.com".into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap();

        let claims = keys.verify(&res.token).unwrap();
        assert_eq!(claims.sub, stored.id);
        assert_eq!(claims.email, stored.email);
        assert_eq!(claims.name, stored.name);
        assert_eq!(res.user, PublicUser::from(&stored));
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let db = memory_pool().await;
        let keys = keys();
        register(&db, &keys, register_req("P", "p@example.com", "secret1"))
            .await
            .unwrap();

        for (email, password) in [("p@example.com", "wrong-pass"), ("nobody@example.com", "secret1")] {
            let err = login(
                &db,
                &keys,
                LoginRequest {
                    email: email.into(),
                    password: password.into(),
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials));
        }
    }
}
