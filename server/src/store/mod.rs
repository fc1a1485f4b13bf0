use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    ContributionCalendar, Difficulty, Goal, LeaderboardMetric, Quest, QuestAssignment, QuestId,
    QuestStatus, Rank, RankRecord, UserId, UserStats,
};

#[cfg(test)]
pub mod memory;

/// A user on the public leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardUser {
    pub id: UserId,
    pub username: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub stats: UserStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredGoal {
    pub id: i32,
    pub title: String,
    pub goal: Goal,
    pub created_at: DateTime<Utc>,
}

/// A quest before it has an id and a creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestDraft {
    pub title: String,
    pub description: String,
    pub repo_url: String,
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
    pub points: u32,
}

#[derive(Debug, Clone)]
pub struct GithubAccount {
    pub user_id: UserId,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted(QuestAssignment),
    /// Another active assignment or a previous one of the same user exists.
    Conflict,
}

/// Persistence boundary of the server.
///
/// Every write that other requests could race with is a single conditional
/// statement in the implementation: best ranks only go down, quest progress
/// only goes forward and a quest gets at most one active assignment.
#[async_trait]
pub trait Store: Send + Sync {
    /// Overwrites every stats column of the user and the stored calendar.
    async fn save_stats(
        &self,
        user_id: &str,
        stats: &UserStats,
        calendar: &ContributionCalendar,
    ) -> anyhow::Result<()>;

    async fn stats(&self, user_id: &str) -> anyhow::Result<Option<UserStats>>;

    /// `None` when the user does not exist.
    async fn is_public(&self, user_id: &str) -> anyhow::Result<Option<bool>>;

    /// Calendar stored by the last sync; empty if the user never synced.
    async fn calendar(&self, user_id: &str) -> anyhow::Result<Option<ContributionCalendar>>;

    /// Scores of every user on the public leaderboard.
    async fn peer_scores(&self, metric: LeaderboardMetric) -> anyhow::Result<Vec<u64>>;

    /// Best public users first.
    async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        limit: u32,
    ) -> anyhow::Result<Vec<LeaderboardUser>>;

    /// Stores `current` and lowers the best rank if `current` beats it.
    async fn record_rank(
        &self,
        user_id: &str,
        metric: LeaderboardMetric,
        current: Option<Rank>,
    ) -> anyhow::Result<RankRecord>;

    async fn rank(&self, user_id: &str, metric: LeaderboardMetric) -> anyhow::Result<RankRecord>;

    async fn quest(&self, quest_id: QuestId) -> anyhow::Result<Option<Quest>>;

    /// Every quest, newest first.
    async fn quests(&self) -> anyhow::Result<Vec<Quest>>;

    async fn insert_quest(&self, created_by: &str, draft: &QuestDraft) -> anyhow::Result<Quest>;

    async fn assignments(&self, quest_id: QuestId) -> anyhow::Result<Vec<QuestAssignment>>;

    /// Active assignments across all quests.
    async fn active_assignments(&self) -> anyhow::Result<Vec<QuestAssignment>>;

    async fn user_assignments(&self, user_id: &str) -> anyhow::Result<Vec<QuestAssignment>>;

    /// Inserts an active assignment unless it conflicts with an existing one.
    async fn try_accept_quest(
        &self,
        quest_id: QuestId,
        user_id: &str,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<AcceptOutcome>;

    /// Deletes the active assignment of `user_id`. Returns whether one existed.
    async fn drop_assignment(&self, quest_id: QuestId, user_id: &str) -> anyhow::Result<bool>;

    /// Moves progress forward to `status` and returns the stored progress,
    /// which stays unchanged when `status` is not ahead of it.
    async fn record_quest_progress(
        &self,
        quest_id: QuestId,
        user_id: &str,
        status: QuestStatus,
        fork_url: Option<&str>,
        at: DateTime<Utc>,
    ) -> anyhow::Result<QuestStatus>;

    async fn completed_quests(&self, user_id: &str) -> anyhow::Result<u32>;

    async fn goals(&self, user_id: &str) -> anyhow::Result<Vec<StoredGoal>>;

    async fn goal(&self, user_id: &str, goal_id: i32) -> anyhow::Result<Option<StoredGoal>>;

    async fn insert_goal(&self, user_id: &str, title: &str, goal: &Goal)
        -> anyhow::Result<StoredGoal>;

    async fn save_goal(&self, user_id: &str, goal: &StoredGoal) -> anyhow::Result<()>;

    async fn github_account(&self, user_id: &str) -> anyhow::Result<Option<GithubAccount>>;

    async fn github_accounts(&self) -> anyhow::Result<Vec<GithubAccount>>;
}
