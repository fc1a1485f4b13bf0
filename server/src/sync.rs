use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocket::fairing::AdHoc;
use rocket_db_pools::Database;
use serde::Serialize;
use shared::{
    compute_rank, compute_streak_stats, earned_badges, longest_streak, ContributionCalendar,
    DayBoundary, GoalStats, IntoEnumIterator, LeaderboardMetric, RankRecord, StreakBadge,
    UserStats,
};
use tracing::instrument;

use crate::db::DB;
use crate::github_pull::GithubClient;
use crate::store::Store;

/// Produces the parsed contribution calendar of a GitHub login.
#[async_trait]
pub trait ContributionSource: Send + Sync {
    async fn contribution_calendar(&self, login: &str) -> anyhow::Result<ContributionCalendar>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRank {
    pub metric: LeaderboardMetric,
    #[serde(flatten)]
    pub rank: RankRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub stats: UserStats,
    pub ranks: Vec<MetricRank>,
    pub longest_streak: u32,
    pub badges: Vec<StreakBadge>,
    pub goals_updated: usize,
}

/// Pulls the calendar of `login`, recomputes every stat of `user_id` and
/// pushes the results to ranks and goals.
#[instrument(skip(store, source, boundary))]
pub async fn sync_user(
    store: &dyn Store,
    source: &dyn ContributionSource,
    user_id: &str,
    login: &str,
    boundary: DayBoundary,
    now: DateTime<Utc>,
) -> anyhow::Result<SyncReport> {
    let calendar = source.contribution_calendar(login).await?;
    let (today, yesterday) = boundary.today_and_yesterday(now);
    let stats = compute_streak_stats(&calendar, today, yesterday);
    store.save_stats(user_id, &stats, &calendar).await?;

    let mut ranks = Vec::new();
    for metric in LeaderboardMetric::iter() {
        let rank = update_rank(store, user_id, metric, metric.score(&stats)).await?;
        ranks.push(MetricRank { metric, rank });
    }

    let goals_updated = refresh_goals(store, user_id, stats).await?;
    let longest = longest_streak(&calendar);
    tracing::info!(
        "Synced {login}: streak {}, total {}, {} goals updated",
        stats.streak,
        stats.total_commits,
        goals_updated
    );

    Ok(SyncReport {
        stats,
        ranks,
        longest_streak: longest,
        badges: earned_badges(longest),
        goals_updated,
    })
}

/// Ranks `score` against the public leaderboard and stores the result.
#[instrument(skip(store))]
pub async fn update_rank(
    store: &dyn Store,
    user_id: &str,
    metric: LeaderboardMetric,
    score: u64,
) -> anyhow::Result<RankRecord> {
    let peers = store.peer_scores(metric).await?;
    let current = compute_rank(score, &peers);
    let mut record = store.rank(user_id, metric).await?;
    if record.observe(current) {
        tracing::info!("{user_id} reached a new best {metric} rank: {current:?}");
    }
    store.record_rank(user_id, metric, current).await
}

/// Live rank of `user_id` from the stored stats, or `None` for an unknown user.
pub async fn caller_rank(
    store: &dyn Store,
    user_id: &str,
    metric: LeaderboardMetric,
) -> anyhow::Result<Option<RankRecord>> {
    let Some(stats) = store.stats(user_id).await? else {
        return Ok(None);
    };
    update_rank(store, user_id, metric, metric.score(&stats))
        .await
        .map(Some)
}

/// Re-evaluates every goal of the user and stores the ones that changed.
#[instrument(skip(store, stats))]
pub async fn refresh_goals(
    store: &dyn Store,
    user_id: &str,
    stats: UserStats,
) -> anyhow::Result<usize> {
    let goal_stats = GoalStats {
        total_projects: store.completed_quests(user_id).await?,
        ..GoalStats::from(stats)
    };
    let mut updated = 0;
    for mut stored in store.goals(user_id).await? {
        let before = stored.goal;
        stored.goal.refresh(&goal_stats);
        if stored.goal != before {
            store.save_goal(user_id, &stored).await?;
            updated += 1;
        }
    }
    Ok(updated)
}

#[instrument(skip(db))]
async fn sync_all(db: &DB, boundary: DayBoundary) -> anyhow::Result<()> {
    let accounts = db.github_accounts().await?;
    for account in accounts {
        let client = match GithubClient::new(account.access_token).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(
                    "Failed to create GitHub client for {}: {:#?}",
                    account.user_id,
                    e
                );
                continue;
            }
        };
        if let Err(e) = sync_user(
            db,
            &client,
            &account.user_id,
            &client.login,
            boundary,
            Utc::now(),
        )
        .await
        {
            tracing::error!("Failed to sync {}: {:#?}", account.user_id, e);
        }
    }
    Ok(())
}

pub fn stage(boundary: DayBoundary, sleep_duration: Duration, running: Arc<AtomicBool>) -> AdHoc {
    AdHoc::on_ignite("Contribution sync", move |rocket| async move {
        let running_clone = running.clone();
        rocket
            .attach(AdHoc::on_liftoff(
                "Syncs every connected user every X minutes",
                move |rocket| {
                    Box::pin(async move {
                        let Some(db) = DB::fetch(rocket).cloned() else {
                            tracing::error!("Database is not attached, background sync disabled");
                            return;
                        };
                        rocket::tokio::spawn(async move {
                            let mut interval = rocket::tokio::time::interval(sleep_duration);
                            while running.load(Ordering::Relaxed) {
                                interval.tick().await;

                                if let Err(e) = sync_all(&db, boundary).await {
                                    tracing::error!("Failed to sync contributions: {:#?}", e);
                                }
                            }
                        });
                    })
                },
            ))
            .attach(AdHoc::on_shutdown("Stop contribution sync", |_| {
                Box::pin(async move {
                    running_clone.store(false, Ordering::Relaxed);
                })
            }))
    })
}
