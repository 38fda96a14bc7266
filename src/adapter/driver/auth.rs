use crate::adapter::driver::response_dto::ApiError;
use crate::domain::model::UserId;
use axum::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// 信頼済みのユーザーIDヘッダ
pub const USER_ID_HEADER: &str = "x-user-id";

/// 認証済みユーザー
/// 上流の認証レイヤーがリクエストの extensions に格納したユーザーIDを取り出す。
/// トークンの検証はこのサービスでは行わない
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiError::new(
                        StatusCode::UNAUTHORIZED,
                        "認証されていません",
                        "UNAUTHORIZED",
                    )),
                )
                    .into_response()
            })
    }
}

/// `x-user-id` ヘッダのユーザーIDを認証済みユーザーとして extensions に格納する
/// ゲートウェイでトークン検証済みのリクエストだけが届く構成を前提とする
pub async fn trusted_user_header(mut request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| UserId::from_string(value.trim()).ok());
    if let Some(user_id) = user {
        request.extensions_mut().insert(AuthenticatedUser(user_id));
    }
    next.run(request).await
}
