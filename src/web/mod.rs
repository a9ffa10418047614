// src/web/mod.rs

pub mod handlers;
pub mod types;

pub use handlers::*;
pub use types::*;

use anyhow::Result;
use rocket::data::{Limits, ToByteUnit};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::form::Form;
use rocket::http::{Header, Status};
use rocket::response::content::RawHtml;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{catchers, delete, get, options, post, put, routes, Build, Request, Response, Rocket, State};
use std::sync::Arc;

use crate::app_log;
use crate::auth::{AuthFailure, AuthenticatedUser};
use crate::core::config_manager::MAX_UPLOAD_BYTES;
use crate::core::{ConfigManager, Database};
use crate::environment::SiteConfig;
use crate::export::{BlobFetcher, CommandRenderer, Renderer};
use crate::storage::build_store;
use crate::types::{CvDocument, Profile, Section};

// CORS Fairing
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, PUT, DELETE, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        response.set_header(Header::new(
            "Access-Control-Expose-Headers",
            "Content-Disposition",
        ));
    }
}

// ===== System =====

#[get("/health")]
pub async fn health(db: &State<Database>) -> ApiResult<Json<TextResponse>> {
    handlers::health_handler(db).await
}

#[get("/site")]
pub async fn site_config(site: &State<SiteConfig>) -> Json<DataResponse<SiteConfig>> {
    handlers::site_handler(site).await
}

#[get("/me")]
pub async fn get_current_user(auth: AuthenticatedUser) -> Json<DataResponse<UserInfo>> {
    handlers::get_current_user_handler(auth).await
}

// ===== CV =====

#[get("/cv")]
pub async fn get_cv(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<CvDocument>>> {
    handlers::get_cv_handler(auth, db).await
}

#[get("/cv/html")]
pub async fn cv_html(
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
    site: &State<SiteConfig>,
) -> ApiResult<RawHtml<String>> {
    handlers::cv_html_handler(auth, db, fetcher, site).await
}

#[get("/cv/pdf")]
pub async fn export_cv(
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
    renderer: &State<Arc<dyn Renderer>>,
    site: &State<SiteConfig>,
) -> ApiResult<PdfResponse> {
    handlers::export_cv_handler(auth, db, fetcher, renderer, site).await
}

// ===== Profile =====

#[get("/profile")]
pub async fn get_profile(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Profile>>> {
    handlers::get_profile_handler(auth, db).await
}

#[put("/profile", data = "<request>")]
pub async fn update_profile(
    request: Json<Profile>,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Profile>>> {
    handlers::update_profile_handler(request, auth, db).await
}

#[post("/profile/photo", data = "<upload>")]
pub async fn upload_photo(
    upload: Form<UploadForm<'_>>,
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
) -> ApiResult<Json<DataResponse<StoredBlob>>> {
    handlers::upload_photo_handler(upload, auth, db, fetcher).await
}

#[get("/profile/photo")]
pub async fn get_photo(
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
) -> ApiResult<FileResponse> {
    handlers::get_photo_handler(auth, db, fetcher).await
}

// ===== Sections =====

#[get("/sections/<kind>")]
pub async fn list_sections(
    kind: &str,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Vec<Section>>>> {
    handlers::list_sections_handler(kind, auth, db).await
}

#[post("/sections/<kind>", data = "<request>")]
pub async fn create_section(
    kind: &str,
    request: Json<SectionInput>,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Custom<Json<DataResponse<Section>>>> {
    handlers::create_section_handler(kind, request, auth, db).await
}

#[get("/sections/<kind>/<id>")]
pub async fn get_section(
    kind: &str,
    id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Section>>> {
    handlers::get_section_handler(kind, id, auth, db).await
}

#[put("/sections/<kind>/<id>", data = "<request>")]
pub async fn update_section(
    kind: &str,
    id: i64,
    request: Json<SectionInput>,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<DataResponse<Section>>> {
    handlers::update_section_handler(kind, id, request, auth, db).await
}

#[delete("/sections/<kind>/<id>")]
pub async fn delete_section(
    kind: &str,
    id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<Json<ActionResponse>> {
    handlers::delete_section_handler(kind, id, auth, db).await
}

#[post("/sections/<kind>/<id>/certificate", data = "<upload>")]
pub async fn upload_certificate(
    kind: &str,
    id: i64,
    upload: Form<UploadForm<'_>>,
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
) -> ApiResult<Json<DataResponse<StoredBlob>>> {
    handlers::upload_certificate_handler(kind, id, upload, auth, db, fetcher).await
}

#[get("/certificates/<kind>/<id>")]
pub async fn download_certificate(
    kind: &str,
    id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    fetcher: &State<BlobFetcher>,
) -> ApiResult<FileResponse> {
    handlers::download_certificate_handler(kind, id, auth, db, fetcher).await
}

#[options("/<_..>")]
pub async fn options() -> Status {
    Status::Ok
}

// ===== Error catchers =====

#[rocket::catch(400)]
pub fn bad_request() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Invalid request format".to_string(),
        "BAD_REQUEST".to_string(),
        vec![
            "Check your request JSON format".to_string(),
            "Verify all required fields are present".to_string(),
        ],
    ))
}

#[rocket::catch(401)]
pub fn unauthorized(req: &Request) -> Json<StandardErrorResponse> {
    let failure = req.local_cache(|| AuthFailure(None));
    Json(auth_error(failure.0))
}

#[rocket::catch(404)]
pub fn not_found_catcher() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Resource not found".to_string(),
        "NOT_FOUND".to_string(),
        vec!["Check the URL and try again".to_string()],
    ))
}

#[rocket::catch(422)]
pub fn unprocessable() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Request body could not be processed".to_string(),
        "UNPROCESSABLE".to_string(),
        vec![
            "Check field names and value types".to_string(),
            "Uploads must be sent as multipart form field 'file'".to_string(),
        ],
    ))
}

#[rocket::catch(500)]
pub fn internal_error_catcher() -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        "Internal server error".to_string(),
        "INTERNAL_ERROR".to_string(),
        vec![
            "Try again in a few moments".to_string(),
            "Contact support if the problem persists".to_string(),
        ],
    ))
}

/// Assemble the server from prepared state. Used by `start_web_server` and tests.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let limits = Limits::default()
        .limit("file", MAX_UPLOAD_BYTES.bytes())
        .limit("data-form", (MAX_UPLOAD_BYTES + 1024 * 1024).bytes());
    let figment = rocket::Config::figment().merge(("limits", limits));

    rocket::custom(figment)
        .attach(Cors)
        .manage(state.db)
        .manage(state.auth)
        .manage(state.site)
        .manage(state.fetcher)
        .manage(state.renderer)
        .register(
            "/api",
            catchers![
                bad_request,
                unauthorized,
                not_found_catcher,
                unprocessable,
                internal_error_catcher
            ],
        )
        .mount(
            "/api",
            routes![
                health,
                site_config,
                get_current_user,
                get_cv,
                cv_html,
                export_cv,
                get_profile,
                update_profile,
                upload_photo,
                get_photo,
                list_sections,
                create_section,
                get_section,
                update_section,
                delete_section,
                upload_certificate,
                download_certificate,
                options,
            ],
        )
}

// Main server start function
pub async fn start_web_server(config: ConfigManager) -> Result<()> {
    config.ensure_directories().await?;

    let environment = &config.environment;
    let db = Database::new(&environment.database_path).await?;
    let store = build_store(&environment.storage).await;
    let fetcher = BlobFetcher::new(store, environment.media_root.clone());
    let renderer: Arc<dyn Renderer> =
        Arc::new(CommandRenderer::new(environment.renderer.clone()));

    app_log!(info, "Starting cvfolio API server");
    app_log!(info, "Database: {}", environment.database_path.display());
    app_log!(info, "Blob store: {}", fetcher.store().name());
    app_log!(info, "Local media root: {}", environment.media_root.display());
    app_log!(info, "Renderer: {}", environment.renderer.program);

    let state = AppState {
        db,
        auth: config.auth.clone(),
        site: config.site().clone(),
        fetcher,
        renderer,
    };

    build_rocket(state)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Server failed: {}", e))?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use rocket::http::Status;

    #[rocket::async_test]
    async fn test_health_and_site_are_public() {
        let ctx = TestContext::new(&[]).await;

        let response = ctx.client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = ctx.client.get("/api/site").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["data"]["site_header"], "cvfolio");
    }

    #[rocket::async_test]
    async fn test_me_reports_auth_failures() {
        let ctx = TestContext::new(&[]).await;
        let alice = ctx.user("alice").await;

        let response = ctx.get("/api/me", &alice).await;
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["data"]["username"], "alice");
        assert_eq!(body["data"]["full_name"], "Tester alice");

        let response = ctx
            .client
            .get("/api/me")
            .header(rocket::http::Header::new("Authorization", "Bearer nope"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["error_code"], "TOKEN_VERIFICATION_FAILED");
    }

    #[rocket::async_test]
    async fn test_inactive_user_is_rejected() {
        let ctx = TestContext::new(&[]).await;
        let alice = ctx.user("alice").await;
        crate::core::UserRepository::new(ctx.db.pool())
            .set_active("alice", false)
            .await
            .unwrap();

        let response = ctx.get("/api/cv", &alice).await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["error_code"], "INACTIVE_USER");
    }

    #[rocket::async_test]
    async fn test_cors_headers() {
        let ctx = TestContext::new(&[]).await;
        let response = ctx.client.options("/api/cv/pdf").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(
            response.headers().get_one("Access-Control-Allow-Origin"),
            Some("*")
        );
    }
}
