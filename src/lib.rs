pub mod bridge;
pub mod config;
pub mod cooldown;
pub mod dom;
pub mod engine;
#[cfg(test)]
mod fixtures;
pub mod identity;
pub mod page;
pub mod policy;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod trust;
pub mod visibility;

pub use bridge::{BridgeMessage, StaticOracle};
pub use config::{ConfigChange, EngineSettings, FilterConfig};
pub use dom::{Document, Dom};
pub use engine::{FilterEngine, ScanReport};
pub use policy::Visibility;
pub use runtime::{FilterRuntime, PageEvent, RuntimeHandle};
pub use trust::{TrustCache, TrustRecord};
