pub mod config;
pub mod db;
pub mod github_pull;
pub mod goals;
pub mod profile;
pub mod quests;
pub mod store;
pub mod sync;
