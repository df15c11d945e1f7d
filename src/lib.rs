//! Watch AI coding agents through the `agj` command line tool and report
//! when one of them starts waiting for a permission decision.

pub mod agj;
pub mod exec;
pub mod settings;
pub mod store;

pub use agj::{AgentInstance, AgjClient, HealthStatus, PermissionTransition};
pub use settings::{Config, RefreshInterval, Settings};
pub use store::{AgentStore, StoreSnapshot};
