use std::time::Duration;

use serde::Deserialize;
use shared::DayBoundary;

pub const DEFAULT_SYNC_INTERVAL_IN_MINUTES: u64 = 60;
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 50;
pub const MAX_LEADERBOARD_LIMIT: u32 = 100;

/// Process environment. The database itself is configured through
/// `ROCKET_DATABASES`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Env {
    pub sync_interval_in_minutes: Option<u64>,
    pub timezone_offset_minutes: Option<i32>,
    pub leaderboard_limit: Option<u32>,
}

/// Settings shared with the request handlers as managed state.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub day_boundary: DayBoundary,
    pub sync_interval: Duration,
    pub leaderboard_limit: u32,
}

impl ServerConfig {
    pub fn from_env(env: &Env) -> anyhow::Result<Self> {
        let day_boundary = match env.timezone_offset_minutes {
            Some(minutes) => DayBoundary::from_offset_minutes(minutes).ok_or_else(|| {
                anyhow::anyhow!("TIMEZONE_OFFSET_MINUTES {minutes} is not a valid offset")
            })?,
            None => DayBoundary::utc(),
        };
        let minutes = env
            .sync_interval_in_minutes
            .unwrap_or(DEFAULT_SYNC_INTERVAL_IN_MINUTES)
            .max(1);
        Ok(Self {
            day_boundary,
            sync_interval: Duration::from_secs(minutes * 60),
            leaderboard_limit: env
                .leaderboard_limit
                .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
                .clamp(1, MAX_LEADERBOARD_LIMIT),
        })
    }

    /// Requested page size, bounded by the configured default and maximum.
    pub fn leaderboard_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.leaderboard_limit)
            .clamp(1, MAX_LEADERBOARD_LIMIT)
    }
}
