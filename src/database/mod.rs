//! Persistence
//!
//! Every engine talks to a [`Store`]. Two implementations ship:
//! [`MemoryStore`] for tests and single-process runs, and [`DatabasePool`]
//! for PostgreSQL.

pub mod engagements;
pub mod farmers;
pub mod memory;
pub mod pool;
pub mod portfolios;
pub mod store;
pub mod users;

pub use engagements::EngagementRepository;
pub use farmers::FarmerRepository;
pub use memory::MemoryStore;
pub use pool::DatabasePool;
pub use portfolios::PortfolioRepository;
pub use store::{CandidateQuery, PortfolioMutation, ReviewerCandidate, Store};
pub use users::UserRepository;

/// Decode a text column into one of the SCREAMING_SNAKE_CASE enums
pub(crate) fn parse_column<T>(
    value: &str,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> anyhow::Result<T> {
    parse(value).ok_or_else(|| anyhow::anyhow!("Unrecognized {} value: {}", column, value))
}
