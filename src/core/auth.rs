use crate::core::{AppError, AppState};
use crate::entities::{RoleSet, is_valid_user_id};
use crate::ws::{CLOSE_AUTH_REQUIRED, CLOSE_TOKEN_EXPIRED, CLOSE_TOKEN_INVALID};
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::{body::Body, extract::Request, http::Response, middleware::Next};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

// struct che codifica il contenuto del token jwt emesso dal servizio di autenticazione
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub exp: usize, // Expiry time of the token
    pub iat: usize, // Issued at time of the token
    #[serde(rename = "userId")]
    pub user_id: String,
    // informativi: i ruoli autorevoli vengono letti dalla directory utenti
    #[serde(default)]
    pub roles: RoleSet,
}

/// Motivi per cui un client non può essere autenticato
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    Missing,
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

impl AuthError {
    /// Codice di chiusura WebSocket associato all'errore
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::Missing => CLOSE_AUTH_REQUIRED,
            AuthError::Expired => CLOSE_TOKEN_EXPIRED,
            AuthError::Invalid => CLOSE_TOKEN_INVALID,
        }
    }
}

#[instrument(skip(secret, roles))]
pub fn encode_jwt(
    user_id: &str,
    roles: RoleSet,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    debug!("Encoding JWT token for user");
    let now = Utc::now();
    let expire: chrono::TimeDelta = Duration::hours(24);
    let exp: usize = (now + expire).timestamp() as usize;
    let iat: usize = now.timestamp() as usize;
    let claim = Claims {
        iat,
        exp,
        user_id: user_id.to_string(),
        roles,
    };

    encode(
        &Header::default(),
        &claim,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .inspect_err(|e| error!("Failed to encode JWT token: {:?}", e))
}

#[instrument(skip(jwt_token, secret))]
pub fn decode_jwt(jwt_token: &str, secret: &str) -> Result<TokenData<Claims>, AuthError> {
    debug!("Decoding JWT token");
    decode::<Claims>(
        jwt_token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| {
        debug!("JWT token decoded successfully for user: {}", data.claims.user_id);
        data
    })
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => {
            warn!("JWT token expired");
            AuthError::Expired
        }
        _ => {
            warn!("Failed to decode JWT token: {:?}", e);
            AuthError::Invalid
        }
    })
    .and_then(|data| {
        if !is_valid_user_id(&data.claims.user_id) {
            warn!("JWT token without a usable user id");
            Err(AuthError::Invalid)
        } else {
            Ok(data)
        }
    })
}

/// Estrae il bearer token: prima dal parametro `token` della query, poi dall'header Authorization
pub fn extract_token(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Verifica il token presente nella richiesta di upgrade
pub fn authenticate_token(
    query_token: Option<&str>,
    headers: &HeaderMap,
    secret: &str,
) -> Result<Claims, AuthError> {
    let token = extract_token(query_token, headers).ok_or(AuthError::Missing)?;
    decode_jwt(&token, secret).map(|data| data.claims)
}

#[instrument(skip(state, req, next))]
pub async fn authentication_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, AppError> {
    debug!("Running authentication middleware");
    let auth_header = match req.headers().get(header::AUTHORIZATION) {
        Some(header) => header.to_str().map_err(|_| {
            warn!("Invalid authorization header format");
            AppError::forbidden("Empty header is not allowed")
        })?,
        None => {
            warn!("Missing authorization header");
            return Err(AppError::forbidden("Please add the JWT token to the header"));
        }
    };

    let mut parts = auth_header.split_whitespace();
    let token = match (parts.next(), parts.next()) {
        (Some("Bearer"), Some(token)) => token.to_string(),
        _ => {
            warn!("Malformed authorization header");
            return Err(AppError::unauthorized("Invalid authorization header format"));
        }
    };

    let token_data = decode_jwt(&token, &state.jwt_secret)
        .map_err(|_| AppError::unauthorized("Unable to decode token"))?;

    // Fetch the user details from the directory
    let current_user = match state.users.find_by_id(&token_data.claims.user_id).await? {
        Some(user) => {
            info!("User authenticated: {}", user.user_id);
            user
        }
        None => {
            warn!("User not found in directory: {}", token_data.claims.user_id);
            return Err(AppError::unauthorized("You are not an authorized user"));
        }
    };
    req.extensions_mut().insert(current_user);
    Ok(next.run(req).await)
}
