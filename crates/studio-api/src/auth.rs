use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use studio_db::Database;
use studio_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest, UserSummary, ValidationIssue};

use crate::error::{ApiError, join_error};
use crate::simulation::SimulationConfig;
use crate::storage::ArtifactStore;

/// Lifetime of issued tokens.
const TOKEN_TTL_DAYS: i64 = 7;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub artifacts: ArtifactStore,
    pub simulation: SimulationConfig,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    let mut issues = Vec::new();
    if !looks_like_email(&req.email) {
        issues.push(ValidationIssue::new("email", "Invalid email address"));
    }
    if req.password.chars().count() < 8 {
        issues.push(ValidationIssue::new("password", "Password must be at least 8 characters"));
    }
    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    // Hashing and the inserts are blocking; keep them off the async runtime
    let db = state.clone();
    let email = req.email.clone();
    let user_id = tokio::task::spawn_blocking(move || {
        if db.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::BadRequest("User already exists".into()));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        // A concurrent signup can claim the email between the check and the insert
        let user_id = Uuid::new_v4();
        if !db.db.create_user(&user_id.to_string(), &email, &password_hash)? {
            return Err(ApiError::BadRequest("User already exists".into()));
        }
        Ok(user_id)
    })
    .await
    .map_err(join_error)??;

    let token = create_token(&state.jwt_secret, user_id, &req.email)?;
    info!("User {} signed up", user_id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully".into(),
            token,
            user: UserSummary {
                id: user_id,
                email: req.email,
            },
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !looks_like_email(&req.email) {
        return Err(ApiError::Validation(vec![ValidationIssue::new(
            "email",
            "Invalid email address",
        )]));
    }

    let db = state.clone();
    let email = req.email.clone();
    let user = tokio::task::spawn_blocking(move || {
        let user = db
            .db
            .get_user_by_email(&email)?
            .ok_or(ApiError::Unauthorized("Invalid credentials"))?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|e| anyhow::anyhow!("corrupt password hash for {}: {}", user.id, e))?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized("Invalid credentials"))?;

        Ok::<_, ApiError>(user)
    })
    .await
    .map_err(join_error)??;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.email)?;

    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        token,
        user: UserSummary {
            id: user_id,
            email: user.email,
        },
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain.
fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
        && !email.chars().any(char::is_whitespace)
}
