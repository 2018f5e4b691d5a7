mod health_check;
mod upload;
mod users;

use actix_web::http::StatusCode;
use serde::Serialize;

pub use health_check::health_check;
pub use users::{
    change_password, current_user, login, logout, refresh_token, register, update_account,
    update_avatar, update_cover_image,
};

/// Success body returned to the client
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: &str) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.to_string(),
            success: status.is_success(),
        }
    }
}
