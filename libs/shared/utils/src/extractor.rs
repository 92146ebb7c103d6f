use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Query parameter accepted in place of the `Authorization` header.
/// Browsers cannot set headers on a WebSocket handshake.
pub const ACCESS_TOKEN_QUERY_PARAM: &str = "access_token";

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn bearer_token<B>(request: &Request<B>) -> Result<String, AppError> {
    if let Some(auth_header) = request.headers().get("Authorization") {
        let auth_value = auth_header
            .to_str()
            .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

        return auth_value
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()));
    }

    request
        .uri()
        .query()
        .and_then(|query| {
            query.split('&').find_map(|pair| {
                pair.strip_prefix(ACCESS_TOKEN_QUERY_PARAM)
                    .and_then(|rest| rest.strip_prefix('='))
            })
        })
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_from_header() {
        let request = Request::builder()
            .uri("/x")
            .header("Authorization", "Bearer abc.def.ghi")
            .body(())
            .unwrap();
        assert_eq!(bearer_token(&request).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_from_query() {
        let request = Request::builder()
            .uri("/rooms/r1/ws?peer_id=p1&access_token=abc.def.ghi")
            .body(())
            .unwrap();
        assert_eq!(bearer_token(&request).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        let request = Request::builder()
            .uri("/x")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap();
        assert!(bearer_token(&request).is_err());

        let missing = Request::builder().uri("/x").body(()).unwrap();
        assert!(bearer_token(&missing).is_err());
    }
}
