use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    reconcile_best_rank, AssignmentStatus, ContributionCalendar, Goal, LeaderboardMetric, Quest,
    QuestAssignment, QuestId, QuestStatus, Rank, RankRecord, UserId, UserStats,
};

use super::{AcceptOutcome, GithubAccount, LeaderboardUser, QuestDraft, Store, StoredGoal};

#[derive(Debug, Clone, Default)]
pub struct MemoryUser {
    pub username: Option<String>,
    pub is_public: bool,
    pub stats: UserStats,
    pub calendar: ContributionCalendar,
    pub access_token: Option<String>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, MemoryUser>,
    ranks: HashMap<(UserId, LeaderboardMetric), RankRecord>,
    quests: HashMap<QuestId, Quest>,
    assignments: Vec<QuestAssignment>,
    goals: Vec<(UserId, StoredGoal)>,
    next_goal_id: i32,
    next_quest_id: QuestId,
    accept_attempts: usize,
}

/// Same guarantees as the Postgres store, enforced under one mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: &str, user: MemoryUser) {
        self.inner
            .lock()
            .unwrap()
            .users
            .insert(user_id.to_string(), user);
    }

    pub fn user(&self, user_id: &str) -> Option<MemoryUser> {
        self.inner.lock().unwrap().users.get(user_id).cloned()
    }

    pub fn add_quest(&self, quest: Quest) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_quest_id = inner.next_quest_id.max(quest.id);
        inner.quests.insert(quest.id, quest);
    }

    /// Number of conditional inserts tried by `try_accept_quest`.
    pub fn accept_attempts(&self) -> usize {
        self.inner.lock().unwrap().accept_attempts
    }

    pub fn assignment(&self, quest_id: QuestId, user_id: &str) -> Option<QuestAssignment> {
        self.inner
            .lock()
            .unwrap()
            .assignments
            .iter()
            .find(|a| a.quest_id == quest_id && a.user_id == user_id)
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_stats(
        &self,
        user_id: &str,
        stats: &UserStats,
        calendar: &ContributionCalendar,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.entry(user_id.to_string()).or_default();
        user.stats = *stats;
        user.calendar = calendar.clone();
        Ok(())
    }

    async fn stats(&self, user_id: &str) -> anyhow::Result<Option<UserStats>> {
        Ok(self.user(user_id).map(|user| user.stats))
    }

    async fn is_public(&self, user_id: &str) -> anyhow::Result<Option<bool>> {
        Ok(self.user(user_id).map(|user| user.is_public))
    }

    async fn calendar(&self, user_id: &str) -> anyhow::Result<Option<ContributionCalendar>> {
        Ok(self.user(user_id).map(|user| user.calendar))
    }

    async fn peer_scores(&self, metric: LeaderboardMetric) -> anyhow::Result<Vec<u64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .values()
            .filter(|user| user.is_public)
            .map(|user| metric.score(&user.stats))
            .collect())
    }

    async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        limit: u32,
    ) -> anyhow::Result<Vec<LeaderboardUser>> {
        let inner = self.inner.lock().unwrap();
        let mut users: Vec<_> = inner
            .users
            .iter()
            .filter(|(_, user)| user.is_public)
            .map(|(id, user)| LeaderboardUser {
                id: id.clone(),
                username: user.username.clone(),
                name: None,
                image: None,
                stats: user.stats,
            })
            .collect();
        users.sort_by(|a, b| {
            metric
                .score(&b.stats)
                .cmp(&metric.score(&a.stats))
                .then_with(|| a.id.cmp(&b.id))
        });
        users.truncate(limit as usize);
        Ok(users)
    }

    async fn record_rank(
        &self,
        user_id: &str,
        metric: LeaderboardMetric,
        current: Option<Rank>,
    ) -> anyhow::Result<RankRecord> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .ranks
            .entry((user_id.to_string(), metric))
            .or_default();
        record.best_rank = reconcile_best_rank(current, record.best_rank);
        record.current_rank = current;
        Ok(*record)
    }

    async fn rank(&self, user_id: &str, metric: LeaderboardMetric) -> anyhow::Result<RankRecord> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ranks
            .get(&(user_id.to_string(), metric))
            .copied()
            .unwrap_or_default())
    }

    async fn quest(&self, quest_id: QuestId) -> anyhow::Result<Option<Quest>> {
        Ok(self.inner.lock().unwrap().quests.get(&quest_id).cloned())
    }

    async fn quests(&self) -> anyhow::Result<Vec<Quest>> {
        let inner = self.inner.lock().unwrap();
        let mut quests: Vec<_> = inner.quests.values().cloned().collect();
        quests.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(quests)
    }

    async fn insert_quest(&self, created_by: &str, draft: &QuestDraft) -> anyhow::Result<Quest> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_quest_id += 1;
        let quest = Quest {
            id: inner.next_quest_id,
            created_by: created_by.to_string(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            repo_url: draft.repo_url.clone(),
            tags: draft.tags.clone(),
            difficulty: draft.difficulty,
            points: draft.points,
        };
        inner.quests.insert(quest.id, quest.clone());
        Ok(quest)
    }

    async fn active_assignments(&self) -> anyhow::Result<Vec<QuestAssignment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .assignments
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect())
    }

    async fn user_assignments(&self, user_id: &str) -> anyhow::Result<Vec<QuestAssignment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn assignments(&self, quest_id: QuestId) -> anyhow::Result<Vec<QuestAssignment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .assignments
            .iter()
            .filter(|a| a.quest_id == quest_id)
            .cloned()
            .collect())
    }

    async fn try_accept_quest(
        &self,
        quest_id: QuestId,
        user_id: &str,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<AcceptOutcome> {
        // Concurrent accepts all get past their prechecks before one inserts.
        rocket::tokio::task::yield_now().await;
        let mut inner = self.inner.lock().unwrap();
        inner.accept_attempts += 1;
        let conflict = inner.assignments.iter().any(|a| {
            a.quest_id == quest_id && (a.user_id == user_id || a.is_active())
        });
        if conflict {
            return Ok(AcceptOutcome::Conflict);
        }
        let assignment = QuestAssignment {
            quest_id,
            user_id: user_id.to_string(),
            status: AssignmentStatus::Active,
            progress: QuestStatus::NotStarted,
            fork_url: None,
            started_at,
            completed_at: None,
        };
        inner.assignments.push(assignment.clone());
        Ok(AcceptOutcome::Accepted(assignment))
    }

    async fn drop_assignment(&self, quest_id: QuestId, user_id: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.assignments.len();
        inner
            .assignments
            .retain(|a| !(a.quest_id == quest_id && a.user_id == user_id && a.is_active()));
        Ok(inner.assignments.len() != before)
    }

    async fn record_quest_progress(
        &self,
        quest_id: QuestId,
        user_id: &str,
        status: QuestStatus,
        fork_url: Option<&str>,
        at: DateTime<Utc>,
    ) -> anyhow::Result<QuestStatus> {
        let mut inner = self.inner.lock().unwrap();
        let Some(assignment) = inner
            .assignments
            .iter_mut()
            .find(|a| a.quest_id == quest_id && a.user_id == user_id)
        else {
            anyhow::bail!("no assignment of quest {quest_id} for {user_id}");
        };
        if status.step() > assignment.progress.step() {
            assignment.progress = status;
            if let Some(fork_url) = fork_url {
                assignment.fork_url = Some(fork_url.to_string());
            }
            if status == QuestStatus::Completed {
                assignment.status = AssignmentStatus::Completed;
                assignment.completed_at.get_or_insert(at);
            }
        }
        Ok(assignment.progress)
    }

    async fn completed_quests(&self, user_id: &str) -> anyhow::Result<u32> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id && a.status == AssignmentStatus::Completed)
            .count() as u32)
    }

    async fn goals(&self, user_id: &str) -> anyhow::Result<Vec<StoredGoal>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .goals
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, goal)| goal.clone())
            .collect())
    }

    async fn goal(&self, user_id: &str, goal_id: i32) -> anyhow::Result<Option<StoredGoal>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .goals
            .iter()
            .find(|(owner, goal)| owner == user_id && goal.id == goal_id)
            .map(|(_, goal)| goal.clone()))
    }

    async fn insert_goal(
        &self,
        user_id: &str,
        title: &str,
        goal: &Goal,
    ) -> anyhow::Result<StoredGoal> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_goal_id += 1;
        let stored = StoredGoal {
            id: inner.next_goal_id,
            title: title.to_string(),
            goal: *goal,
            created_at: Utc::now(),
        };
        inner.goals.push((user_id.to_string(), stored.clone()));
        Ok(stored)
    }

    async fn save_goal(&self, user_id: &str, goal: &StoredGoal) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((_, stored)) = inner
            .goals
            .iter_mut()
            .find(|(owner, stored)| owner == user_id && stored.id == goal.id)
        {
            *stored = goal.clone();
        }
        Ok(())
    }

    async fn github_account(&self, user_id: &str) -> anyhow::Result<Option<GithubAccount>> {
        Ok(self.user(user_id).and_then(|user| {
            user.access_token.map(|access_token| GithubAccount {
                user_id: user_id.to_string(),
                access_token,
            })
        }))
    }

    async fn github_accounts(&self) -> anyhow::Result<Vec<GithubAccount>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter_map(|(id, user)| {
                user.access_token.clone().map(|access_token| GithubAccount {
                    user_id: id.clone(),
                    access_token,
                })
            })
            .collect())
    }
}
