use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    can_accept, can_drop, check_quest, merge_status, Difficulty, Quest, QuestAccessError,
    QuestAssignment, QuestEvidence, QuestId, QuestStatus, RepoRef, UserId,
};
use tracing::instrument;

use crate::store::{AcceptOutcome, QuestDraft, Store};

/// Looks up what a user did to a quest repository on GitHub.
#[async_trait]
pub trait QuestEvidenceSource: Send + Sync {
    async fn quest_evidence(
        &self,
        login: &str,
        upstream: &RepoRef,
        since: DateTime<Utc>,
    ) -> anyhow::Result<QuestEvidence>;
}

#[derive(Debug, thiserror::Error)]
pub enum QuestError {
    #[error("quest {0} not found")]
    NotFound(QuestId),
    #[error(transparent)]
    Access(#[from] QuestAccessError),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestCheck {
    /// Result of this lookup, `Error` included.
    pub checked: QuestStatus,
    /// Progress kept in storage after the lookup.
    pub status: QuestStatus,
    pub fork_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub repo_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
    pub points: Option<u32>,
}

/// A quest as one user sees it on the quest board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestListing {
    #[serde(flatten)]
    pub quest: Quest,
    pub is_taken: bool,
    /// Current active holder.
    pub accepted_by: Option<UserId>,
    /// Assignment of the viewer, active or completed.
    pub mine: Option<QuestAssignment>,
}

#[instrument(skip(store))]
pub async fn list_quests(
    store: &dyn Store,
    viewer: Option<&str>,
) -> Result<Vec<QuestListing>, QuestError> {
    let quests = store.quests().await?;
    let active = store.active_assignments().await?;
    let mine = match viewer {
        Some(viewer) => store.user_assignments(viewer).await?,
        None => Vec::new(),
    };

    Ok(quests
        .into_iter()
        .map(|quest| {
            let accepted_by = active
                .iter()
                .find(|a| a.quest_id == quest.id)
                .map(|a| a.user_id.clone());
            let mine = mine.iter().find(|a| a.quest_id == quest.id).cloned();
            QuestListing {
                is_taken: accepted_by.is_some(),
                accepted_by,
                mine,
                quest,
            }
        })
        .collect())
}

#[instrument(skip(store, new_quest), fields(title = %new_quest.title))]
pub async fn create_quest(
    store: &dyn Store,
    created_by: &str,
    new_quest: NewQuest,
) -> Result<Quest, QuestError> {
    let title = new_quest.title.trim();
    if title.is_empty() {
        return Err(QuestError::Invalid("a quest needs a title".to_string()));
    }
    let Some(repo) = RepoRef::parse(&new_quest.repo_url) else {
        return Err(QuestError::Invalid(format!(
            "{:?} is not a GitHub repository",
            new_quest.repo_url
        )));
    };

    let draft = QuestDraft {
        title: title.to_string(),
        description: new_quest.description.trim().to_string(),
        repo_url: format!("https://github.com/{}", repo.full_name()),
        tags: new_quest
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        difficulty: new_quest.difficulty,
        points: new_quest
            .points
            .unwrap_or_else(|| new_quest.difficulty.default_points()),
    };
    let quest = store.insert_quest(created_by, &draft).await?;
    tracing::info!("{created_by} created quest {} on {}", quest.id, repo.full_name());
    Ok(quest)
}

#[instrument(skip(store))]
pub async fn accept_quest(
    store: &dyn Store,
    quest_id: QuestId,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<QuestAssignment, QuestError> {
    let quest = store
        .quest(quest_id)
        .await?
        .ok_or(QuestError::NotFound(quest_id))?;
    can_accept(&quest, user_id, &store.assignments(quest_id).await?)?;

    match store.try_accept_quest(quest_id, user_id, now).await? {
        AcceptOutcome::Accepted(assignment) => {
            tracing::info!("{user_id} accepted quest {quest_id}");
            Ok(assignment)
        }
        AcceptOutcome::Conflict => {
            // Someone got in between the precheck and the insert. Re-read to
            // tell the caller why.
            let assignments = store.assignments(quest_id).await?;
            match can_accept(&quest, user_id, &assignments) {
                Err(e) => Err(e.into()),
                Ok(()) => Err(QuestAccessError::Taken.into()),
            }
        }
    }
}

#[instrument(skip(store))]
pub async fn drop_quest(
    store: &dyn Store,
    quest_id: QuestId,
    user_id: &str,
) -> Result<(), QuestError> {
    if store.quest(quest_id).await?.is_none() {
        return Err(QuestError::NotFound(quest_id));
    }
    let assignments = store.assignments(quest_id).await?;
    let mine = assignments.iter().find(|a| a.user_id == user_id);
    can_drop(user_id, mine)?;

    if !store.drop_assignment(quest_id, user_id).await? {
        return Err(QuestAccessError::NotHolder.into());
    }
    tracing::info!("{user_id} dropped quest {quest_id}");
    Ok(())
}

/// Reads the quest state from GitHub and stores it if it moved forward.
///
/// A failed lookup is reported as `Error` and leaves storage untouched.
#[instrument(skip(store, source))]
pub async fn check_progress(
    store: &dyn Store,
    source: &dyn QuestEvidenceSource,
    quest_id: QuestId,
    user_id: &str,
    login: &str,
    now: DateTime<Utc>,
) -> Result<QuestCheck, QuestError> {
    let quest = store
        .quest(quest_id)
        .await?
        .ok_or(QuestError::NotFound(quest_id))?;
    let assignments = store.assignments(quest_id).await?;
    let assignment = assignments
        .into_iter()
        .find(|a| a.user_id == user_id)
        .ok_or(QuestAccessError::NotHolder)?;
    let Some(upstream) = RepoRef::parse(&quest.repo_url) else {
        tracing::warn!(
            "Quest {quest_id} points at {:?}, which is not a GitHub repository",
            quest.repo_url
        );
        return Ok(QuestCheck {
            checked: QuestStatus::Error,
            status: assignment.progress,
            fork_url: assignment.fork_url,
        });
    };

    let evidence = source
        .quest_evidence(login, &upstream, assignment.started_at)
        .await;
    if let Err(e) = &evidence {
        tracing::warn!("Quest evidence lookup failed for {login} on {quest_id}: {e:#}");
    }
    let checked = check_quest(&evidence);

    if merge_status(assignment.progress, checked) == assignment.progress {
        return Ok(QuestCheck {
            checked,
            status: assignment.progress,
            fork_url: assignment.fork_url,
        });
    }

    let fork_url = evidence.ok().and_then(|evidence| evidence.fork_url);
    let status = store
        .record_quest_progress(quest_id, user_id, checked, fork_url.as_deref(), now)
        .await?;
    if status == QuestStatus::Completed {
        tracing::info!("{user_id} completed quest {quest_id}");
    }
    Ok(QuestCheck {
        checked,
        status,
        fork_url: fork_url.or(assignment.fork_url),
    })
}
