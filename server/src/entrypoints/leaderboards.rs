use evergreeners_server::{config::ServerConfig, db::DB, store::Store, sync::caller_rank};
use rocket::{serde::json::Json, State};
use shared::{rank_entries, LeaderboardMetric};

use super::types::{ApiError, ApiResult, CallerId, LeaderboardEntry, LeaderboardResponse};

#[get("/leaderboard?<filter>&<limit>")]
async fn get_leaderboard(
    caller: Option<CallerId>,
    db: &State<DB>,
    config: &State<ServerConfig>,
    filter: Option<&str>,
    limit: Option<u32>,
) -> ApiResult<LeaderboardResponse> {
    let metric = LeaderboardMetric::from_filter(filter);
    let limit = config.leaderboard_limit(limit);
    let users = db
        .leaderboard(metric, limit)
        .await
        .map_err(|e| ApiError::internal("Failed to get leaderboard", e))?;

    let ranked = rank_entries(users.iter().map(|user| user.stats).enumerate(), metric);
    let mut users: Vec<_> = users.into_iter().map(Some).collect();
    let entries = ranked
        .into_iter()
        .filter_map(|entry| {
            let user = users.get_mut(entry.key)?.take()?;
            Some(LeaderboardEntry::new(entry, user))
        })
        .collect();

    let me = match caller {
        Some(CallerId(user_id)) => caller_rank(db.inner(), &user_id, metric)
            .await
            .map_err(|e| ApiError::internal("Failed to get caller rank", e))?,
        None => None,
    };

    Ok(Json(LeaderboardResponse {
        metric,
        entries,
        me,
    }))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing leaderboard entrypoints", |rocket| async {
        rocket.mount("/api", rocket::routes![get_leaderboard])
    })
}
