use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    AssignmentStatus, CommitWindow, Difficulty, Goal, GoalKind, Quest, QuestAssignment,
    QuestStatus, RankRecord, UserStats,
};

use crate::store::{LeaderboardUser, StoredGoal};

fn count(value: i32) -> u32 {
    value.max(0) as u32
}

pub fn to_db_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, Default)]
pub struct UserStatsRecord {
    pub streak: i32,
    pub total_commits: i32,
    pub today_commits: i32,
    pub yesterday_commits: i32,
    pub weekly_commits: i32,
    pub active_days: i32,
}

impl From<UserStatsRecord> for UserStats {
    fn from(record: UserStatsRecord) -> Self {
        Self {
            streak: count(record.streak),
            total_commits: count(record.total_commits),
            today_commits: count(record.today_commits),
            yesterday_commits: count(record.yesterday_commits),
            weekly_commits: count(record.weekly_commits),
            active_days: count(record.active_days),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaderboardRecord {
    pub id: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    #[sqlx(flatten)]
    pub stats: UserStatsRecord,
}

impl From<LeaderboardRecord> for LeaderboardUser {
    fn from(record: LeaderboardRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            name: record.name,
            image: record.image,
            stats: record.stats.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, sqlx::FromRow, Default)]
pub struct RankRow {
    pub current_rank: Option<i32>,
    pub best_rank: Option<i32>,
}

impl From<RankRow> for RankRecord {
    fn from(row: RankRow) -> Self {
        Self {
            current_rank: row.current_rank.map(count),
            best_rank: row.best_rank.map(count),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestRecord {
    pub id: i32,
    pub created_by: String,
    pub title: String,
    pub description: String,
    pub repo_url: String,
    pub tags: Vec<String>,
    pub difficulty: String,
    pub points: i32,
}

impl TryFrom<QuestRecord> for Quest {
    type Error = anyhow::Error;

    fn try_from(record: QuestRecord) -> Result<Self, Self::Error> {
        let difficulty: Difficulty = record.difficulty.parse().map_err(|_| {
            anyhow::anyhow!(
                "quest {} has unknown difficulty {:?}",
                record.id,
                record.difficulty
            )
        })?;
        Ok(Self {
            id: record.id,
            created_by: record.created_by,
            title: record.title,
            description: record.description,
            repo_url: record.repo_url,
            tags: record.tags,
            difficulty,
            points: count(record.points),
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssignmentRecord {
    pub quest_id: i32,
    pub user_id: String,
    pub status: String,
    pub progress: i16,
    pub fork_url: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub fn progress_step(status: QuestStatus) -> Option<i16> {
    status.step().map(i16::from)
}

pub fn progress_from_step(step: i16) -> QuestStatus {
    u8::try_from(step)
        .ok()
        .and_then(QuestStatus::from_step)
        .unwrap_or_default()
}

impl TryFrom<AssignmentRecord> for QuestAssignment {
    type Error = anyhow::Error;

    fn try_from(record: AssignmentRecord) -> Result<Self, Self::Error> {
        let status: AssignmentStatus = record.status.parse().map_err(|_| {
            anyhow::anyhow!(
                "assignment of quest {} has unknown status {:?}",
                record.quest_id,
                record.status
            )
        })?;
        Ok(Self {
            quest_id: record.quest_id,
            user_id: record.user_id,
            status,
            progress: progress_from_step(record.progress),
            fork_url: record.fork_url,
            started_at: record.started_at,
            completed_at: record.completed_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GoalRecord {
    pub id: i32,
    pub title: String,
    pub goal_type: String,
    pub commit_window: Option<String>,
    pub current: i32,
    pub target: i32,
    pub completed: bool,
    pub manual_override: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<GoalRecord> for StoredGoal {
    type Error = anyhow::Error;

    fn try_from(record: GoalRecord) -> Result<Self, Self::Error> {
        let window = record
            .commit_window
            .as_deref()
            .and_then(|window| window.parse::<CommitWindow>().ok());
        if record.goal_type == "commits" && window.is_none() {
            tracing::warn!(
                "Goal {} has no commit window, guessing it from the title",
                record.id
            );
        }
        let kind = GoalKind::from_parts(&record.goal_type, window, &record.title).ok_or_else(
            || anyhow::anyhow!("goal {} has unknown type {:?}", record.id, record.goal_type),
        )?;
        Ok(Self {
            id: record.id,
            title: record.title,
            goal: Goal {
                kind,
                current: count(record.current),
                target: count(record.target),
                completed: record.completed,
                manual: record.manual_override,
            },
            created_at: record.created_at,
        })
    }
}
