use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocket::fairing::AdHoc;
use rocket_db_pools::Database;
use shared::{
    ContributionCalendar, Goal, LeaderboardMetric, Quest, QuestAssignment, QuestId, QuestStatus,
    Rank, RankRecord, RawContributionDay, UserStats,
};
use sqlx::{types::Json, PgPool};
use tracing::instrument;

use crate::store::{AcceptOutcome, GithubAccount, LeaderboardUser, QuestDraft, Store, StoredGoal};

pub mod types;

use types::{
    progress_from_step, progress_step, to_db_count, AssignmentRecord, GoalRecord,
    LeaderboardRecord, QuestRecord, RankRow, UserStatsRecord,
};

#[derive(Database, Clone, Debug)]
#[database("evergreeners")]
pub struct DB(PgPool);

const ASSIGNMENT_COLUMNS: &str =
    "quest_id, user_id, status, progress, fork_url, started_at, completed_at";
const QUEST_COLUMNS: &str =
    "id, created_by, title, description, repo_url, tags, difficulty, points";
const GOAL_COLUMNS: &str =
    "id, title, goal_type, commit_window, current, target, completed, manual_override, created_at";

/// Column holding the score a leaderboard is ordered by. Only ever one of
/// these constants ends up in a query string.
const fn metric_column(metric: LeaderboardMetric) -> &'static str {
    match metric {
        LeaderboardMetric::Streak => "streak",
        LeaderboardMetric::TotalCommits => "total_commits",
        LeaderboardMetric::WeeklyCommits => "weekly_commits",
    }
}

#[async_trait]
impl Store for DB {
    #[instrument(skip(self, stats, calendar))]
    async fn save_stats(
        &self,
        user_id: &str,
        stats: &UserStats,
        calendar: &ContributionCalendar,
    ) -> anyhow::Result<()> {
        let contribution_data = serde_json::to_value(calendar.to_raw())?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET streak = $2,
                total_commits = $3,
                today_commits = $4,
                yesterday_commits = $5,
                weekly_commits = $6,
                active_days = $7,
                contribution_data = $8,
                is_github_connected = TRUE,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(to_db_count(stats.streak))
        .bind(to_db_count(stats.total_commits))
        .bind(to_db_count(stats.today_commits))
        .bind(to_db_count(stats.yesterday_commits))
        .bind(to_db_count(stats.weekly_commits))
        .bind(to_db_count(stats.active_days))
        .bind(contribution_data)
        .execute(&self.0)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("user {user_id} does not exist");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stats(&self, user_id: &str) -> anyhow::Result<Option<UserStats>> {
        let record: Option<UserStatsRecord> = sqlx::query_as(
            r#"
            SELECT streak, total_commits, today_commits, yesterday_commits, weekly_commits, active_days
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(record.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn is_public(&self, user_id: &str) -> anyhow::Result<Option<bool>> {
        let row: Option<(bool,)> = sqlx::query_as("SELECT is_public FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.0)
            .await?;
        Ok(row.map(|(is_public,)| is_public))
    }

    #[instrument(skip(self))]
    async fn calendar(&self, user_id: &str) -> anyhow::Result<Option<ContributionCalendar>> {
        let row: Option<(Option<Json<Vec<RawContributionDay>>>,)> =
            sqlx::query_as("SELECT contribution_data FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.0)
                .await?;
        Ok(row.map(|(data,)| {
            data.map(|Json(raw)| ContributionCalendar::from_raw(&raw))
                .unwrap_or_default()
        }))
    }

    #[instrument(skip(self))]
    async fn peer_scores(&self, metric: LeaderboardMetric) -> anyhow::Result<Vec<u64>> {
        let query = format!(
            "SELECT {}::BIGINT FROM users WHERE is_public",
            metric_column(metric)
        );
        let scores: Vec<(i64,)> = sqlx::query_as(&query).fetch_all(&self.0).await?;
        Ok(scores
            .into_iter()
            .map(|(score,)| score.max(0) as u64)
            .collect())
    }

    #[instrument(skip(self))]
    async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        limit: u32,
    ) -> anyhow::Result<Vec<LeaderboardUser>> {
        let query = format!(
            r#"
            SELECT id, username, name, image,
                   streak, total_commits, today_commits, yesterday_commits, weekly_commits, active_days
            FROM users
            WHERE is_public
            ORDER BY {} DESC, id ASC
            LIMIT $1
            "#,
            metric_column(metric)
        );
        let records: Vec<LeaderboardRecord> = sqlx::query_as(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.0)
            .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn record_rank(
        &self,
        user_id: &str,
        metric: LeaderboardMetric,
        current: Option<Rank>,
    ) -> anyhow::Result<RankRecord> {
        // Same rule as `shared::reconcile_best_rank`, evaluated by Postgres so
        // that concurrent syncs of one user cannot lose an improvement.
        let row: RankRow = sqlx::query_as(
            r#"
            INSERT INTO user_ranks (user_id, metric, current_rank, best_rank)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (user_id, metric) DO UPDATE
            SET current_rank = EXCLUDED.current_rank,
                best_rank = CASE
                    WHEN EXCLUDED.best_rank IS NOT NULL
                         AND (user_ranks.best_rank IS NULL OR user_ranks.best_rank > EXCLUDED.best_rank)
                    THEN EXCLUDED.best_rank
                    ELSE user_ranks.best_rank
                END
            RETURNING current_rank, best_rank
            "#,
        )
        .bind(user_id)
        .bind(metric.as_ref())
        .bind(current.map(to_db_count))
        .fetch_one(&self.0)
        .await?;
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn rank(&self, user_id: &str, metric: LeaderboardMetric) -> anyhow::Result<RankRecord> {
        let row: Option<RankRow> = sqlx::query_as(
            "SELECT current_rank, best_rank FROM user_ranks WHERE user_id = $1 AND metric = $2",
        )
        .bind(user_id)
        .bind(metric.as_ref())
        .fetch_optional(&self.0)
        .await?;
        Ok(row.unwrap_or_default().into())
    }

    #[instrument(skip(self))]
    async fn quest(&self, quest_id: QuestId) -> anyhow::Result<Option<Quest>> {
        let query = format!("SELECT {QUEST_COLUMNS} FROM quests WHERE id = $1");
        let record: Option<QuestRecord> = sqlx::query_as(&query)
            .bind(quest_id)
            .fetch_optional(&self.0)
            .await?;
        record.map(Quest::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn quests(&self) -> anyhow::Result<Vec<Quest>> {
        let query = format!("SELECT {QUEST_COLUMNS} FROM quests ORDER BY id DESC");
        let records: Vec<QuestRecord> = sqlx::query_as(&query).fetch_all(&self.0).await?;
        records.into_iter().map(Quest::try_from).collect()
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    async fn insert_quest(&self, created_by: &str, draft: &QuestDraft) -> anyhow::Result<Quest> {
        let query = format!(
            r#"
            INSERT INTO quests (created_by, title, description, repo_url, tags, difficulty, points)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {QUEST_COLUMNS}
            "#
        );
        let difficulty: &'static str = draft.difficulty.into();
        let record: QuestRecord = sqlx::query_as(&query)
            .bind(created_by)
            .bind(&draft.title)
            .bind(&draft.description)
            .bind(&draft.repo_url)
            .bind(&draft.tags)
            .bind(difficulty)
            .bind(to_db_count(draft.points))
            .fetch_one(&self.0)
            .await?;
        record.try_into()
    }

    #[instrument(skip(self))]
    async fn assignments(&self, quest_id: QuestId) -> anyhow::Result<Vec<QuestAssignment>> {
        let query = format!("SELECT {ASSIGNMENT_COLUMNS} FROM quest_assignments WHERE quest_id = $1");
        let records: Vec<AssignmentRecord> = sqlx::query_as(&query)
            .bind(quest_id)
            .fetch_all(&self.0)
            .await?;
        records.into_iter().map(QuestAssignment::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn active_assignments(&self) -> anyhow::Result<Vec<QuestAssignment>> {
        let query =
            format!("SELECT {ASSIGNMENT_COLUMNS} FROM quest_assignments WHERE status = 'active'");
        let records: Vec<AssignmentRecord> = sqlx::query_as(&query).fetch_all(&self.0).await?;
        records.into_iter().map(QuestAssignment::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn user_assignments(&self, user_id: &str) -> anyhow::Result<Vec<QuestAssignment>> {
        let query = format!("SELECT {ASSIGNMENT_COLUMNS} FROM quest_assignments WHERE user_id = $1");
        let records: Vec<AssignmentRecord> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_all(&self.0)
            .await?;
        records.into_iter().map(QuestAssignment::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn try_accept_quest(
        &self,
        quest_id: QuestId,
        user_id: &str,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<AcceptOutcome> {
        // The partial unique index on active assignments and the primary key
        // make this insert the only arbiter between concurrent accepts.
        let query = format!(
            r#"
            INSERT INTO quest_assignments (quest_id, user_id, status, progress, started_at)
            VALUES ($1, $2, 'active', 0, $3)
            ON CONFLICT DO NOTHING
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let record: Option<AssignmentRecord> = sqlx::query_as(&query)
            .bind(quest_id)
            .bind(user_id)
            .bind(started_at)
            .fetch_optional(&self.0)
            .await?;
        match record {
            Some(record) => Ok(AcceptOutcome::Accepted(record.try_into()?)),
            None => Ok(AcceptOutcome::Conflict),
        }
    }

    #[instrument(skip(self))]
    async fn drop_assignment(&self, quest_id: QuestId, user_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "DELETE FROM quest_assignments WHERE quest_id = $1 AND user_id = $2 AND status = 'active'",
        )
        .bind(quest_id)
        .bind(user_id)
        .execute(&self.0)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn record_quest_progress(
        &self,
        quest_id: QuestId,
        user_id: &str,
        status: QuestStatus,
        fork_url: Option<&str>,
        at: DateTime<Utc>,
    ) -> anyhow::Result<QuestStatus> {
        let Some(step) = progress_step(status) else {
            anyhow::bail!("{status:?} is not a storable quest progress");
        };
        let mut tx = self.0.begin().await?;
        sqlx::query(
            r#"
            UPDATE quest_assignments
            SET progress = $3,
                fork_url = COALESCE($4, fork_url),
                status = CASE WHEN $3 = 2 THEN 'completed' ELSE status END,
                completed_at = CASE WHEN $3 = 2 THEN COALESCE(completed_at, $5) ELSE completed_at END
            WHERE quest_id = $1 AND user_id = $2 AND progress < $3
            "#,
        )
        .bind(quest_id)
        .bind(user_id)
        .bind(step)
        .bind(fork_url)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        let stored: Option<(i16,)> = sqlx::query_as(
            "SELECT progress FROM quest_assignments WHERE quest_id = $1 AND user_id = $2",
        )
        .bind(quest_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        match stored {
            Some((step,)) => Ok(progress_from_step(step)),
            None => anyhow::bail!("no assignment of quest {quest_id} for {user_id}"),
        }
    }

    #[instrument(skip(self))]
    async fn completed_quests(&self, user_id: &str) -> anyhow::Result<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM quest_assignments WHERE user_id = $1 AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.0)
        .await?;
        Ok(count.max(0) as u32)
    }

    #[instrument(skip(self))]
    async fn goals(&self, user_id: &str) -> anyhow::Result<Vec<StoredGoal>> {
        let query =
            format!("SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = $1 ORDER BY created_at, id");
        let records: Vec<GoalRecord> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_all(&self.0)
            .await?;
        records.into_iter().map(StoredGoal::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn goal(&self, user_id: &str, goal_id: i32) -> anyhow::Result<Option<StoredGoal>> {
        let query = format!("SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = $1 AND id = $2");
        let record: Option<GoalRecord> = sqlx::query_as(&query)
            .bind(user_id)
            .bind(goal_id)
            .fetch_optional(&self.0)
            .await?;
        record.map(StoredGoal::try_from).transpose()
    }

    #[instrument(skip(self, goal))]
    async fn insert_goal(
        &self,
        user_id: &str,
        title: &str,
        goal: &Goal,
    ) -> anyhow::Result<StoredGoal> {
        let query = format!(
            r#"
            INSERT INTO goals (user_id, title, goal_type, commit_window, current, target, completed, manual_override)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {GOAL_COLUMNS}
            "#
        );
        let record: GoalRecord = sqlx::query_as(&query)
            .bind(user_id)
            .bind(title)
            .bind(goal.kind.type_name())
            .bind(goal.kind.commit_window().map(|window| window.as_ref().to_string()))
            .bind(to_db_count(goal.current))
            .bind(to_db_count(goal.target))
            .bind(goal.completed)
            .bind(goal.manual)
            .fetch_one(&self.0)
            .await?;
        record.try_into()
    }

    #[instrument(skip(self, goal), fields(goal_id = goal.id))]
    async fn save_goal(&self, user_id: &str, goal: &StoredGoal) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE goals
            SET title = $3,
                current = $4,
                target = $5,
                completed = $6,
                manual_override = $7
            WHERE user_id = $1 AND id = $2
            "#,
        )
        .bind(user_id)
        .bind(goal.id)
        .bind(&goal.title)
        .bind(to_db_count(goal.goal.current))
        .bind(to_db_count(goal.goal.target))
        .bind(goal.goal.completed)
        .bind(goal.goal.manual)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn github_account(&self, user_id: &str) -> anyhow::Result<Option<GithubAccount>> {
        let row: Option<(String, String)> = sqlx::query_as(
            r#"
            SELECT user_id, access_token
            FROM accounts
            WHERE user_id = $1 AND provider_id = 'github' AND access_token IS NOT NULL
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.map(|(user_id, access_token)| GithubAccount {
            user_id,
            access_token,
        }))
    }

    #[instrument(skip(self))]
    async fn github_accounts(&self) -> anyhow::Result<Vec<GithubAccount>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (user_id) user_id, access_token
            FROM accounts
            WHERE provider_id = 'github' AND access_token IS NOT NULL
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.0)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, access_token)| GithubAccount {
                user_id,
                access_token,
            })
            .collect())
    }
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("SQLx Stage", |rocket| async { rocket.attach(DB::init()) })
}
