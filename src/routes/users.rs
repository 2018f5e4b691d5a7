//! User and session routes
//!
//! Thin adapters between HTTP and the session/account services: extract
//! input, call the service, wrap the result and manage session cookies.

use actix_multipart::Multipart;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::account::AccountService;
use crate::auth::{AccessClaims, TokenIssuer, TokenPair};
use crate::configuration::{ApplicationSettings, CookieSettings};
use crate::cookies::{removal_cookie, session_cookie, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::error::AppError;
use crate::routes::upload::MultipartForm;
use crate::routes::ApiResponse;
use crate::session::{LoginCredentials, Registration, SessionManager};
use crate::store::{ImageKind, PublicUser};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateAccountRequest {
    pub fullname: Option<String>,
    pub email: Option<String>,
}

#[derive(Serialize)]
pub struct LoginPayload {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

fn with_session_cookies(
    status: StatusCode,
    tokens: &TokenPair,
    issuer: &TokenIssuer,
    cookies: &CookieSettings,
) -> actix_web::HttpResponseBuilder {
    let mut builder = HttpResponse::build(status);
    builder
        .cookie(session_cookie(
            ACCESS_TOKEN_COOKIE,
            tokens.access_token.clone(),
            issuer.access_token_expiry(),
            cookies,
        ))
        .cookie(session_cookie(
            REFRESH_TOKEN_COOKIE,
            tokens.refresh_token.clone(),
            issuer.refresh_token_expiry(),
            cookies,
        ));
    builder
}

/// POST /api/v1/users/register
///
/// Multipart form with `username`, `email`, `fullname`, `password` and an
/// `avatar` file (required) plus an optional `coverImage` file.
///
/// # Errors
/// - 400: Blank field, missing avatar, or failed upload
/// - 409: Username or email already registered
pub async fn register(
    payload: Multipart,
    sessions: web::Data<SessionManager>,
    application: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let form = MultipartForm::read(payload, application.get_ref()).await?;

    let user = sessions
        .register(Registration {
            username: form.field("username"),
            email: form.field("email"),
            fullname: form.field("fullname"),
            password: form.field("password"),
            avatar: form.file_path(ImageKind::Avatar.field_name()),
            cover_image: form.file_path(ImageKind::CoverImage.field_name()),
        })
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    )))
}

/// POST /api/v1/users/login
///
/// # Errors
/// - 400: Neither username nor email supplied
/// - 404: No such user
/// - 401: Wrong password
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionManager>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let outcome = sessions
        .login(LoginCredentials {
            username: form.username,
            email: form.email,
            password: form.password,
        })
        .await?;

    Ok(with_session_cookies(
        StatusCode::OK,
        &outcome.tokens,
        sessions.token_issuer(),
        cookies.get_ref(),
    ).json(
        ApiResponse::new(
            StatusCode::OK,
            LoginPayload {
                user: outcome.user,
                tokens: outcome.tokens,
            },
            "User logged in successfully",
        ),
    ))
}

/// POST /api/v1/users/logout (authenticated)
pub async fn logout(
    claims: web::ReqData<AccessClaims>,
    sessions: web::Data<SessionManager>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    sessions.logout(claims.user_id()?).await?;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ACCESS_TOKEN_COOKIE, cookies.get_ref()))
        .cookie(removal_cookie(REFRESH_TOKEN_COOKIE, cookies.get_ref()))
        .json(ApiResponse::new(
            StatusCode::OK,
            serde_json::json!({}),
            "User logged out",
        )))
}

/// POST /api/v1/users/refresh-token
///
/// Accepts the refresh token from the `refreshToken` cookie or the JSON
/// body field of the same name; the cookie wins when both are present.
///
/// # Errors
/// - 401: Missing, invalid, expired, or already used refresh token
pub async fn refresh_token(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    sessions: web::Data<SessionManager>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let cookie_token = req.cookie(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string());
    let body_token = body.and_then(|b| b.into_inner().refresh_token);

    let tokens = sessions
        .refresh(cookie_token.as_deref(), body_token.as_deref())
        .await?;

    Ok(with_session_cookies(
        StatusCode::OK,
        &tokens,
        sessions.token_issuer(),
        cookies.get_ref(),
    ).json(ApiResponse::new(
        StatusCode::OK,
        tokens.clone(),
        "Access token refreshed",
    )))
}

/// POST /api/v1/users/change-password (authenticated)
pub async fn change_password(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<ChangePasswordRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    sessions
        .change_password(
            claims.user_id()?,
            form.old_password.as_deref(),
            form.new_password.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        serde_json::json!({}),
        "Password changed successfully",
    )))
}

/// GET /api/v1/users/current-user (authenticated)
pub async fn current_user(
    claims: web::ReqData<AccessClaims>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user = accounts.current_user(claims.user_id()?).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        user,
        "User fetched successfully",
    )))
}

/// PATCH /api/v1/users/update-account (authenticated)
pub async fn update_account(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<UpdateAccountRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user = accounts
        .update_account(claims.user_id()?, form.fullname.as_deref(), form.email.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        user,
        "Account details updated successfully",
    )))
}

async fn update_image(
    kind: ImageKind,
    claims: web::ReqData<AccessClaims>,
    payload: Multipart,
    accounts: web::Data<AccountService>,
    application: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let form = MultipartForm::read(payload, application.get_ref()).await?;

    let user = accounts
        .update_image(user_id, kind, form.file_path(kind.field_name()))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        user,
        "Image updated successfully",
    )))
}

/// PATCH /api/v1/users/avatar (authenticated)
pub async fn update_avatar(
    claims: web::ReqData<AccessClaims>,
    payload: Multipart,
    accounts: web::Data<AccountService>,
    application: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    update_image(ImageKind::Avatar, claims, payload, accounts, application).await
}

/// PATCH /api/v1/users/cover-image (authenticated)
pub async fn update_cover_image(
    claims: web::ReqData<AccessClaims>,
    payload: Multipart,
    accounts: web::Data<AccountService>,
    application: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    update_image(ImageKind::CoverImage, claims, payload, accounts, application).await
}
