use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

pub type UserId = String;
pub type QuestId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Points a quest is worth when its creator does not say otherwise.
    pub const fn default_points(&self) -> u32 {
        match self {
            Self::Easy => 10,
            Self::Medium => 30,
            Self::Hard => 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: QuestId,
    pub created_by: UserId,
    pub title: String,
    pub description: String,
    pub repo_url: String,
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
    pub points: u32,
}

/// Progress of a quest as read from GitHub.
///
/// `Error` means the lookup failed this time. It says nothing about the
/// quest itself and must never replace a stored status.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuestStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Error,
}

impl QuestStatus {
    /// Position in the `not_started -> in_progress -> completed` protocol.
    pub const fn step(&self) -> Option<u8> {
        match self {
            Self::NotStarted => Some(0),
            Self::InProgress => Some(1),
            Self::Completed => Some(2),
            Self::Error => None,
        }
    }

    pub const fn from_step(step: u8) -> Option<Self> {
        match step {
            0 => Some(Self::NotStarted),
            1 => Some(Self::InProgress),
            2 => Some(Self::Completed),
            _ => None,
        }
    }
}

/// What the GitHub collaborator found for one user and one quest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestEvidence {
    pub fork_exists: bool,
    pub fork_url: Option<String>,
    pub has_qualifying_activity: bool,
}

/// Derives the quest status from one evidence lookup.
///
/// Completion is the second step of the protocol: activity only counts once
/// the fork exists.
pub fn check_quest<E>(evidence: &Result<QuestEvidence, E>) -> QuestStatus {
    match evidence {
        Err(_) => QuestStatus::Error,
        Ok(evidence) if !evidence.fork_exists => QuestStatus::NotStarted,
        Ok(evidence) if evidence.has_qualifying_activity => QuestStatus::Completed,
        Ok(_) => QuestStatus::InProgress,
    }
}

/// Status to keep after a check: progress never goes backwards and a failed
/// check leaves the stored status alone.
pub fn merge_status(persisted: QuestStatus, checked: QuestStatus) -> QuestStatus {
    match (persisted.step(), checked.step()) {
        (_, None) => persisted,
        (None, Some(_)) => checked,
        (Some(old), Some(new)) if new > old => checked,
        _ => persisted,
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestAssignment {
    pub quest_id: QuestId,
    pub user_id: UserId,
    pub status: AssignmentStatus,
    pub progress: QuestStatus,
    pub fork_url: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuestAssignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestAccessError {
    #[error("you cannot accept a quest you created")]
    OwnQuest,
    #[error("you have already completed this quest")]
    AlreadyCompleted,
    #[error("you are already working on this quest")]
    AlreadyActive,
    #[error("this quest has already been taken by someone else")]
    Taken,
    #[error("you are not working on this quest")]
    NotHolder,
}

/// Checks whether `user` may take `quest` given its current `assignments`.
///
/// This only states the precondition. Two users passing it at the same time
/// are told apart by the store, which allows a single active assignment per
/// quest.
pub fn can_accept(
    quest: &Quest,
    user: &str,
    assignments: &[QuestAssignment],
) -> Result<(), QuestAccessError> {
    if quest.created_by == user {
        return Err(QuestAccessError::OwnQuest);
    }
    for assignment in assignments.iter().filter(|a| a.quest_id == quest.id) {
        match (assignment.user_id == user, assignment.status) {
            (true, AssignmentStatus::Completed) => return Err(QuestAccessError::AlreadyCompleted),
            (true, AssignmentStatus::Active) => return Err(QuestAccessError::AlreadyActive),
            (false, AssignmentStatus::Active) => return Err(QuestAccessError::Taken),
            (false, AssignmentStatus::Completed) => {}
        }
    }
    Ok(())
}

/// Only the active holder may drop a quest; completed quests stay completed.
pub fn can_drop(user: &str, assignment: Option<&QuestAssignment>) -> Result<(), QuestAccessError> {
    match assignment {
        Some(assignment) if assignment.user_id == user && assignment.is_active() => Ok(()),
        _ => Err(QuestAccessError::NotHolder),
    }
}

/// `owner/name` of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Accepts `https://github.com/owner/name` (with or without `.git`, a
    /// trailing slash or extra path segments), `github.com/owner/name` and
    /// plain `owner/name`.
    pub fn parse(url: &str) -> Option<Self> {
        let path = url.trim();
        let path = path
            .strip_prefix("https://")
            .or_else(|| path.strip_prefix("http://"))
            .unwrap_or(path);
        let path = path
            .strip_prefix("www.github.com/")
            .or_else(|| path.strip_prefix("github.com/"))
            .unwrap_or(path);

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let name = segments.next()?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        if owner.contains('.') || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
