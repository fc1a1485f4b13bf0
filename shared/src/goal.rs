use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

use super::*;

/// Stats a goal can be measured against. Missing values are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalStats {
    #[serde(flatten)]
    pub user: UserStats,
    pub total_projects: u32,
}

impl From<UserStats> for GoalStats {
    fn from(user: UserStats) -> Self {
        Self {
            user,
            total_projects: 0,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatSelector {
    Streak,
    TotalCommits,
    WeeklyCommits,
    ActiveDays,
    TotalProjects,
}

impl StatSelector {
    pub const fn select(&self, stats: &GoalStats) -> u32 {
        match self {
            Self::Streak => stats.user.streak,
            Self::TotalCommits => stats.user.total_commits,
            Self::WeeklyCommits => stats.user.weekly_commits,
            Self::ActiveDays => stats.user.active_days,
            Self::TotalProjects => stats.total_projects,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommitWindow {
    Weekly,
    Total,
}

impl CommitWindow {
    /// Guesses the window from a goal title the way goals created before the
    /// explicit window existed were interpreted: any title mentioning "week"
    /// counts weekly commits, everything else counts the total.
    pub fn from_legacy_title(title: &str) -> Self {
        if title.to_lowercase().contains("week") {
            Self::Weekly
        } else {
            Self::Total
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "window", rename_all = "snake_case")]
pub enum GoalKind {
    Streak,
    Commits(CommitWindow),
    Days,
    Projects,
}

impl GoalKind {
    pub const fn selector(&self) -> StatSelector {
        match self {
            Self::Streak => StatSelector::Streak,
            Self::Commits(CommitWindow::Weekly) => StatSelector::WeeklyCommits,
            Self::Commits(CommitWindow::Total) => StatSelector::TotalCommits,
            Self::Days => StatSelector::ActiveDays,
            Self::Projects => StatSelector::TotalProjects,
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Streak => "streak",
            Self::Commits(_) => "commits",
            Self::Days => "days",
            Self::Projects => "projects",
        }
    }

    pub const fn commit_window(&self) -> Option<CommitWindow> {
        match self {
            Self::Commits(window) => Some(*window),
            _ => None,
        }
    }

    /// Rebuilds a kind from its stored type name and optional window. A
    /// commits goal without a window falls back to the legacy title guess.
    pub fn from_parts(type_name: &str, window: Option<CommitWindow>, title: &str) -> Option<Self> {
        match type_name {
            "streak" => Some(Self::Streak),
            "commits" => Some(Self::Commits(
                window.unwrap_or_else(|| CommitWindow::from_legacy_title(title)),
            )),
            "days" => Some(Self::Days),
            "projects" => Some(Self::Projects),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub kind: GoalKind,
    pub current: u32,
    pub target: u32,
    pub completed: bool,
    /// `completed` was set explicitly and holds until `current` or `target`
    /// moves.
    pub manual: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalUpdate {
    pub current: Option<u32>,
    pub target: Option<u32>,
    pub completed: Option<bool>,
}

impl Goal {
    /// A fresh goal with `current` seeded from the matching stat.
    pub fn new(kind: GoalKind, target: u32, stats: &GoalStats) -> Self {
        let current = kind.selector().select(stats);
        Self {
            kind,
            current,
            target,
            completed: current >= target,
            manual: false,
        }
    }

    pub fn apply(&mut self, update: GoalUpdate) {
        let moved = update.current.is_some_and(|current| current != self.current)
            || update.target.is_some_and(|target| target != self.target);
        if let Some(current) = update.current {
            self.current = current;
        }
        if let Some(target) = update.target {
            self.target = target;
        }

        match update.completed {
            Some(completed) => {
                self.completed = completed;
                self.manual = true;
            }
            None if moved => {
                self.completed = self.current >= self.target;
                self.manual = false;
            }
            None => {}
        }
    }

    /// Pulls `current` from fresh stats and re-derives completion.
    pub fn refresh(&mut self, stats: &GoalStats) {
        let current = self.kind.selector().select(stats);
        self.completed = evaluate_goal(self, stats);
        if current != self.current {
            self.current = current;
            self.manual = false;
        }
    }

    pub fn progress_percent(&self) -> u32 {
        if self.target == 0 {
            return 100;
        }
        let percent = (u64::from(self.current) * 100 + u64::from(self.target) / 2)
            / u64::from(self.target);
        percent.min(u64::from(u32::MAX)) as u32
    }
}

/// Whether `goal` is complete against `stats`.
///
/// An explicit completion holds as long as the observed value still matches
/// the stored `current`.
pub fn evaluate_goal(goal: &Goal, stats: &GoalStats) -> bool {
    let current = goal.kind.selector().select(stats);
    if goal.manual && current == goal.current {
        goal.completed
    } else {
        current >= goal.target
    }
}
