//! Contribution metrics for Evergreeners.
//!
//! Everything in here is a pure function of already-fetched data: the GitHub
//! calendar, the peer scores, the quest evidence. No clock, no I/O. Callers
//! derive `today`/`yesterday` with [`DayBoundary`] and persist the results
//! themselves.

mod calendar;
mod goal;
mod quest;
mod rank;
mod streak;
mod timeperiod;

pub use calendar::*;
pub use goal::*;
pub use quest::*;
pub use rank::*;
pub use streak::*;
pub use timeperiod::*;
