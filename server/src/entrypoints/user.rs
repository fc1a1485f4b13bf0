use evergreeners_server::{
    config::ServerConfig,
    db::DB,
    github_pull::GithubClient,
    profile::{analytics, user_overview, Analytics, UserOverview},
    store::Store,
    sync::{sync_user, SyncReport},
};
use rocket::{http::Status, serde::json::Json, State};

use super::types::{ApiError, ApiResult, CallerId};

/// GitHub client acting for `user_id`, from the token stored at sign in.
pub async fn github_client(db: &DB, user_id: &str) -> Result<GithubClient, ApiError> {
    let account = db
        .github_account(user_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load GitHub account", e))?
        .ok_or_else(|| ApiError::new(Status::BadRequest, "GitHub account not connected"))?;
    GithubClient::new(account.access_token).await.map_err(|e| {
        tracing::error!("Failed to authenticate {user_id} with GitHub: {e:#}");
        ApiError::new(Status::BadGateway, "GitHub rejected the stored token")
    })
}

#[post("/sync")]
async fn sync(caller: CallerId, db: &State<DB>, config: &State<ServerConfig>) -> ApiResult<SyncReport> {
    let client = github_client(db, &caller.0).await?;
    let report = sync_user(
        db.inner(),
        &client,
        &caller.0,
        &client.login,
        config.day_boundary,
        chrono::Utc::now(),
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to sync {}: {e:#}", caller.0);
        ApiError::new(Status::BadGateway, "failed to sync contributions")
    })?;
    Ok(Json(report))
}

#[get("/stats/<user_id>")]
async fn get_stats(user_id: &str, caller: CallerId, db: &State<DB>) -> ApiResult<UserOverview> {
    let overview = user_overview(db.inner(), &caller.0, user_id).await?;
    Ok(Json(overview))
}

#[get("/analytics/<user_id>")]
async fn get_analytics(
    user_id: &str,
    caller: CallerId,
    db: &State<DB>,
    config: &State<ServerConfig>,
) -> ApiResult<Analytics> {
    let report = analytics(
        db.inner(),
        &caller.0,
        user_id,
        config.day_boundary,
        chrono::Utc::now(),
    )
    .await?;
    Ok(Json(report))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing user entrypoints", |rocket| async {
        rocket.mount("/api/user", rocket::routes![sync, get_stats, get_analytics])
    })
}
