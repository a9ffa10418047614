// src/web/handlers/system_handlers.rs
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::app_log;
use crate::auth::AuthenticatedUser;
use crate::core::Database;
use crate::environment::SiteConfig;
use crate::web::types::*;

pub async fn health_handler(db: &State<Database>) -> ApiResult<Json<TextResponse>> {
    match db.health_check().await {
        Ok(_) => Ok(Json(TextResponse::success("OK"))),
        Err(e) => {
            app_log!(error, "Health check failed: {:#}", e);
            Err(api_error(
                Status::ServiceUnavailable,
                "Database unavailable",
                "DATABASE_ERROR",
                &["Check the database file and permissions"],
            ))
        }
    }
}

pub async fn site_handler(site: &State<SiteConfig>) -> Json<DataResponse<SiteConfig>> {
    Json(DataResponse::success("Site configuration", site.inner().clone()))
}

pub async fn get_current_user_handler(auth: AuthenticatedUser) -> Json<DataResponse<UserInfo>> {
    let user = auth.user();
    Json(DataResponse::success(
        format!("Authenticated as {}", user.username),
        UserInfo {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name(),
            email: user.email.clone(),
        },
    ))
}
