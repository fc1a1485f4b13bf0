use serde::{Deserialize, Serialize};
use shared::{CommitWindow, Goal, GoalKind, GoalStats, GoalUpdate};
use tracing::instrument;

use crate::store::{Store, StoredGoal};

#[derive(Debug, thiserror::Error)]
pub enum GoalError {
    #[error("goal {0} not found")]
    NotFound(i32),
    #[error("unknown goal type {0:?}")]
    UnknownType(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub title: String,
    #[serde(rename = "type")]
    pub goal_type: String,
    #[serde(default)]
    pub window: Option<CommitWindow>,
    pub target: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPatch {
    pub title: Option<String>,
    #[serde(flatten)]
    pub update: GoalUpdate,
}

/// A stored goal together with how far along it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalView {
    #[serde(flatten)]
    pub stored: StoredGoal,
    pub progress_percent: u32,
}

impl From<StoredGoal> for GoalView {
    fn from(stored: StoredGoal) -> Self {
        Self {
            progress_percent: stored.goal.progress_percent(),
            stored,
        }
    }
}

async fn goal_stats(store: &dyn Store, user_id: &str) -> anyhow::Result<GoalStats> {
    let stats = store.stats(user_id).await?.unwrap_or_default();
    Ok(GoalStats {
        total_projects: store.completed_quests(user_id).await?,
        ..GoalStats::from(stats)
    })
}

#[instrument(skip(store))]
pub async fn list_goals(store: &dyn Store, user_id: &str) -> anyhow::Result<Vec<StoredGoal>> {
    store.goals(user_id).await
}

/// Creates a goal with `current` seeded from the stored stats of the user.
#[instrument(skip(store))]
pub async fn create_goal(
    store: &dyn Store,
    user_id: &str,
    new_goal: NewGoal,
) -> Result<StoredGoal, GoalError> {
    if new_goal.goal_type == "commits" && new_goal.window.is_none() {
        tracing::warn!(
            "Commits goal {:?} of {user_id} has no window, guessing it from the title",
            new_goal.title
        );
    }
    let kind = GoalKind::from_parts(&new_goal.goal_type, new_goal.window, &new_goal.title)
        .ok_or_else(|| GoalError::UnknownType(new_goal.goal_type.clone()))?;
    let goal = Goal::new(kind, new_goal.target, &goal_stats(store, user_id).await?);
    Ok(store.insert_goal(user_id, &new_goal.title, &goal).await?)
}

#[instrument(skip(store))]
pub async fn update_goal(
    store: &dyn Store,
    user_id: &str,
    goal_id: i32,
    patch: GoalPatch,
) -> Result<StoredGoal, GoalError> {
    let mut stored = store
        .goal(user_id, goal_id)
        .await?
        .ok_or(GoalError::NotFound(goal_id))?;
    if let Some(title) = patch.title {
        stored.title = title;
    }
    stored.goal.apply(patch.update);
    store.save_goal(user_id, &stored).await?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use shared::UserStats;

    use super::*;
    use crate::store::memory::{MemoryStore, MemoryUser};

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_user(
            "alice",
            MemoryUser {
                stats: UserStats {
                    streak: 12,
                    total_commits: 480,
                    weekly_commits: 9,
                    active_days: 140,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        store
    }

    fn new_goal(goal_type: &str, window: Option<CommitWindow>, title: &str) -> NewGoal {
        NewGoal {
            title: title.to_string(),
            goal_type: goal_type.to_string(),
            window,
            target: 10,
        }
    }

    #[rocket::async_test]
    async fn seeds_from_stored_stats() {
        let store = store();
        let goal = create_goal(&store, "alice", new_goal("streak", None, "Two weeks"))
            .await
            .unwrap();
        assert_eq!(goal.goal.current, 12);
        assert!(goal.goal.completed);

        let goal = create_goal(
            &store,
            "alice",
            new_goal("commits", Some(CommitWindow::Weekly), "Commit more"),
        )
        .await
        .unwrap();
        assert_eq!(goal.goal.current, 9);
        assert!(!goal.goal.completed);
    }

    #[rocket::async_test]
    async fn explicit_window_beats_title() {
        let store = store();
        let goal = create_goal(
            &store,
            "alice",
            new_goal("commits", Some(CommitWindow::Total), "Commits this week"),
        )
        .await
        .unwrap();
        assert_eq!(goal.goal.kind, GoalKind::Commits(CommitWindow::Total));
        assert_eq!(goal.goal.current, 480);
    }

    #[rocket::async_test]
    async fn missing_window_falls_back_to_title() {
        let store = store();
        let goal = create_goal(&store, "alice", new_goal("commits", None, "Weekly push"))
            .await
            .unwrap();
        assert_eq!(goal.goal.kind, GoalKind::Commits(CommitWindow::Weekly));
    }

    #[rocket::async_test]
    async fn unknown_type_is_rejected() {
        let store = store();
        let result = create_goal(&store, "alice", new_goal("stars", None, "Stars")).await;
        assert!(matches!(result, Err(GoalError::UnknownType(t)) if t == "stars"));
    }

    #[rocket::async_test]
    async fn user_without_stats_starts_at_zero() {
        let store = store();
        let goal = create_goal(&store, "nobody", new_goal("days", None, "Days"))
            .await
            .unwrap();
        assert_eq!(goal.goal.current, 0);
        assert!(!goal.goal.completed);
    }

    #[rocket::async_test]
    async fn manual_completion_sticks_until_values_move() {
        let store = store();
        let created = create_goal(&store, "alice", new_goal("days", None, "Days"))
            .await
            .unwrap();
        assert!(created.goal.completed);

        let patch = GoalPatch {
            update: GoalUpdate {
                completed: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };
        let updated = update_goal(&store, "alice", created.id, patch).await.unwrap();
        assert!(!updated.goal.completed);
        assert!(updated.goal.manual);

        let patch = GoalPatch {
            title: Some("More days".to_string()),
            update: GoalUpdate {
                target: Some(200),
                ..Default::default()
            },
        };
        let updated = update_goal(&store, "alice", created.id, patch).await.unwrap();
        assert_eq!(updated.title, "More days");
        assert!(!updated.goal.completed);
        assert!(!updated.goal.manual);

        let listed = list_goals(&store, "alice").await.unwrap();
        assert_eq!(listed, vec![updated]);
    }

    #[rocket::async_test]
    async fn views_carry_progress() {
        let store = store();
        let created = create_goal(
            &store,
            "alice",
            new_goal("commits", Some(CommitWindow::Weekly), "Weekly"),
        )
        .await
        .unwrap();

        let view = GoalView::from(created.clone());
        assert_eq!(view.progress_percent, 90);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["progressPercent"], 90);
        assert_eq!(json["id"], created.id);
        assert_eq!(json["title"], "Weekly");
    }

    #[rocket::async_test]
    async fn goals_are_private_to_their_owner() {
        let store = store();
        let created = create_goal(&store, "alice", new_goal("days", None, "Days"))
            .await
            .unwrap();
        let result = update_goal(&store, "bob", created.id, GoalPatch::default()).await;
        assert!(matches!(result, Err(GoalError::NotFound(_))));
    }
}
