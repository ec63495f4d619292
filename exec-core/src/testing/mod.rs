//! In-memory fakes for every external collaborator trait in [`crate::ports`].
//! Used by this crate's own unit and integration tests, and exported for
//! downstream consumers that want to exercise the execution/integration
//! pipeline without a real venue connection, database, or asset-master
//! feed.

pub mod fakes;

pub use fakes::{
    FakeExecutionEngine, InMemoryCache, InMemoryPortfolioRepository, PermissiveValidator, RecordingEventHandler,
    RiskCapValidator, StaticAssetRegistry,
};
