use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::account::AccountService;
use crate::auth::{PasswordHasher, TokenIssuer};
use crate::blob_store::BlobStore;
use crate::configuration::Settings;
use crate::error::{AppError, ValidationError};
use crate::middleware::{JwtMiddleware, RequestLogger};
use crate::routes::{
    change_password, current_user, health_check, login, logout, refresh_token, register,
    update_account, update_avatar, update_cover_image,
};
use crate::session::SessionManager;
use crate::store::CredentialStore;

const JSON_BODY_LIMIT: usize = 16 * 1024;

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_BODY_LIMIT)
        .error_handler(|err, _req| {
            AppError::from(ValidationError::MalformedRequest(err.to_string())).into()
        })
}

pub fn run(
    listener: TcpListener,
    store: Arc<dyn CredentialStore>,
    blob_store: Arc<dyn BlobStore>,
    settings: &Settings,
) -> Result<Server, std::io::Error> {
    let hasher = PasswordHasher::from_settings(&settings.password)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let issuer = TokenIssuer::new(&settings.jwt);

    let sessions = web::Data::new(SessionManager::new(
        store.clone(),
        blob_store.clone(),
        hasher,
        issuer.clone(),
    ));
    let accounts = web::Data::new(AccountService::new(store, blob_store));
    let application = web::Data::new(settings.application.clone());
    let cookies = web::Data::new(settings.cookies.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)

            // Shared state
            .app_data(json_config())
            .app_data(sessions.clone())
            .app_data(accounts.clone())
            .app_data(application.clone())
            .app_data(cookies.clone())

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v1/users")
                    // Public routes
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh-token", web::post().to(refresh_token))

                    // Protected routes (require a valid access token)
                    .service(
                        web::scope("")
                            .wrap(JwtMiddleware::new(issuer.clone()))
                            .route("/logout", web::post().to(logout))
                            .route("/change-password", web::post().to(change_password))
                            .route("/current-user", web::get().to(current_user))
                            .route("/update-account", web::patch().to(update_account))
                            .route("/avatar", web::patch().to(update_avatar))
                            .route("/cover-image", web::patch().to(update_cover_image)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
