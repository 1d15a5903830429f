use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, MeResponse, PublicUser, RegisterRequest},
        jwt::{AuthUser, JwtKeys},
        services,
    },
    error::{AppJson, Result},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    services::register(&state.db, &keys, payload).await.map(Json)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    services::login(&state.db, &keys, payload).await.map(Json)
}

#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn get_me(AuthUser(claims): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        user: PublicUser::from(&claims),
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState};

    async fn call(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with(uri: &str, authorization: Option<&str>) -> Request<Body> {
        let mut req = Request::get(uri);
        if let Some(value) = authorization {
            req = req.header(header::AUTHORIZATION, value);
        }
        req.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn register_then_me() {
        let app = build_app(AppState::fake(None).await);

        let (status, body) = call(
            app.clone(),
            post_json(
                "/api/register",
                json!({ "name": "Maria", "email": "maria@example.com", "password": "secret1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["user"]["email"], "maria@example.com");

        let (status, me) = call(app, get_with("/api/me", Some(&format!("Bearer {token}")))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user"]["name"], "Maria");
        assert_eq!(me["user"]["id"], body["user"]["id"]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_409() {
        let app = build_app(AppState::fake(None).await);
        let payload = json!({ "name": "A", "email": "a@example.com", "password": "secret1" });
        let (status, _) = call(app.clone(), post_json("/api/register", payload.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(app, post_json("/api/register", payload)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_body_is_400_json() {
        let app = build_app(AppState::fake(None).await);
        let req = Request::post("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn wrong_password_is_401() {
        let app = build_app(AppState::fake(None).await);
        call(
            app.clone(),
            post_json(
                "/api/register",
                json!({ "name": "B", "email": "b@example.com", "password": "secret1" }),
            ),
        )
        .await;
        let (status, body) = call(
            app,
            post_json("/api/login", json!({ "email": "b@example.com", "password": "nope-nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid email or password");
    }

    #[tokio::test]
    async fn me_requires_token() {
        let app = build_app(AppState::fake(None).await);
        let (status, _) = call(app.clone(), get_with("/api/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(app.clone(), get_with("/api/me", Some("Bearer"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(app, get_with("/api/me", Some("Bearer not.a.jwt"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].is_string());
    }
}
