use std::cmp::Reverse;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

use super::*;

pub type Rank = u32;

/// Position of `score` among `peer_scores`: one plus the number of strictly
/// better peers, so equal scores share a rank.
///
/// A zero score has no chain to rank and yields `None`. Whether the caller's
/// own score is part of `peer_scores` makes no difference.
pub fn compute_rank(score: u64, peer_scores: &[u64]) -> Option<Rank> {
    if score == 0 {
        return None;
    }
    let better = peer_scores.iter().filter(|peer| **peer > score).count();
    Some(better as Rank + 1)
}

/// Best rank after observing `current`. Lower is better and the best never
/// gets worse; an unranked observation leaves it as it was.
pub fn reconcile_best_rank(current: Option<Rank>, previous_best: Option<Rank>) -> Option<Rank> {
    match (current, previous_best) {
        (Some(current), Some(best)) if current < best => Some(current),
        (Some(current), None) => Some(current),
        (_, best) => best,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankRecord {
    pub current_rank: Option<Rank>,
    pub best_rank: Option<Rank>,
}

impl RankRecord {
    /// Records `current` and returns whether the best rank improved.
    pub fn observe(&mut self, current: Option<Rank>) -> bool {
        let best = reconcile_best_rank(current, self.best_rank);
        let improved = best != self.best_rank;
        self.current_rank = current;
        self.best_rank = best;
        improved
    }
}

/// What a leaderboard is ordered by.
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
    EnumIter,
    EnumString,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaderboardMetric {
    #[default]
    Streak,
    #[strum(serialize = "commits")]
    #[serde(rename = "commits")]
    TotalCommits,
    #[strum(serialize = "weekly")]
    #[serde(rename = "weekly")]
    WeeklyCommits,
}

impl LeaderboardMetric {
    /// Parses a leaderboard filter; anything unknown ranks by streak.
    pub fn from_filter(filter: Option<&str>) -> Self {
        filter
            .and_then(|filter| filter.parse().ok())
            .unwrap_or_default()
    }

    pub const fn score(&self, stats: &UserStats) -> u64 {
        match self {
            Self::Streak => stats.streak as u64,
            Self::TotalCommits => stats.total_commits as u64,
            Self::WeeklyCommits => stats.weekly_commits as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry<K> {
    pub key: K,
    pub score: u64,
    pub rank: Option<Rank>,
}

/// Orders `entries` best first with competition ranking (1, 2, 2, 4).
///
/// Ties are listed by ascending key so that repeated calls return the same
/// order. Zero scores sort last and stay unranked.
pub fn rank_entries<K: Ord>(
    entries: impl IntoIterator<Item = (K, UserStats)>,
    metric: LeaderboardMetric,
) -> Vec<RankedEntry<K>> {
    let mut scored: Vec<(K, u64)> = entries
        .into_iter()
        .map(|(key, stats)| (key, metric.score(&stats)))
        .collect();
    scored.sort_by(|(key_a, score_a), (key_b, score_b)| {
        (Reverse(*score_a), key_a).cmp(&(Reverse(*score_b), key_b))
    });

    let mut ranked = Vec::with_capacity(scored.len());
    let mut previous: Option<(u64, Rank)> = None;
    for (position, (key, score)) in scored.into_iter().enumerate() {
        let rank = match previous {
            _ if score == 0 => None,
            Some((previous_score, previous_rank)) if previous_score == score => Some(previous_rank),
            _ => Some(position as Rank + 1),
        };
        if let Some(rank) = rank {
            previous = Some((score, rank));
        }
        ranked.push(RankedEntry { key, score, rank });
    }
    ranked
}
