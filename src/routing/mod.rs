pub mod allocator;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod persistence;
pub mod ports;
pub mod store;
pub mod types;

pub use allocator::{QuotaAllocator, TargetGuard, TargetLocks};
pub use engine::RoutingEngine;
pub use error::{RoutingError, RoutingErrorKind};
pub use persistence::FileTargetStore;
pub use ports::TargetStorePort;
pub use store::InMemoryTargetStore;
pub use types::{AcceptRule, RouteDecision, Target, TargetId, Visitor};
