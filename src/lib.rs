//! TrustBridge
//!
//! Trust and verification engine for an agricultural marketplace and a
//! student project-review platform: farmer verification and composite trust
//! scores on one side, peer and lecturer review of student engagements
//! feeding verified portfolios on the other.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs          - Crate root with re-exports
//! ├── main.rs         - Service entrypoint
//! ├── config.rs       - Configuration management
//! ├── error.rs        - Workflow error taxonomy
//! ├── clock.rs        - Injectable time source
//! ├── identity.rs     - Actors, roles and the user directory record
//! ├── notify.rs       - Fire-and-forget notification queue
//! ├── reputation/     - Farmer trust system
//! │   ├── score.rs        - Composite score calculator & tiers
//! │   ├── verification.rs - Verification gate
//! │   └── manager.rs      - Trust event orchestrator
//! ├── review/         - Student project review
//! │   ├── models.rs   - Engagements, peer & lecturer reviews
//! │   ├── router.rs   - Peer reviewer selection
//! │   └── workflow.rs - Engagement state machine
//! ├── portfolio/      - Student portfolios
//! │   ├── models.rs     - Portfolio snapshot, strength & tiers
//! │   └── aggregator.rs - Portfolio writer
//! └── database/       - Storage trait, in-memory and PostgreSQL stores
//! ```

pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod identity;
pub mod notify;
pub mod portfolio;
pub mod reputation;
pub mod review;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TrustBridgeConfig;
pub use database::{DatabasePool, MemoryStore, Store};
pub use error::{WorkflowError, WorkflowResult};
pub use identity::{Actor, Role, UserProfile};
pub use notify::{LogTransport, NotificationQueue, NotificationTransport, Notifier};

pub use reputation::{
    compute_composite, FarmerTier, ScoringParams, TrustEvent, TrustScore, TrustScoreManager,
    VerificationGate, VerificationRequest, VerificationStatus,
};

pub use review::{
    EngagementStatus, EngagementWorkflow, LecturerDecision, PeerFeedback, ProjectBrief,
    ProjectEngagement, ReviewerRouter, StudentTier, Submission,
};

pub use portfolio::{PortfolioAggregator, PortfolioStrength, StudentPortfolioStatus, TierThresholds};
