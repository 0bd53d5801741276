// Library exports for hosts embedding the engine and for integration tests
//
// # Layering
//
//   - `tab`, `tree`, `collapse`: the tree store and its pure operations.
//   - `classifier`, `auto_attach`, `grouping`: decision logic that reads the
//     store and returns tagged decisions.
//   - `engine`: the synchronous state machine that carries decisions out and
//     turns them into host commands.
//   - `driver`: async plumbing around the engine (tokio tasks + channels).
//
// Only `engine` and `driver` keep in-flight state; everything below them is
// plain functions over `TabRegistry`.

/// Crate version, reported to collaborators that ask.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[macro_use]
pub mod debug;

pub mod auto_attach;
pub mod cache;
pub mod classifier;
pub mod codec;
pub mod collapse;
pub mod driver;
pub mod engine;
pub mod gateway;
pub mod group_tab;
pub mod grouping;
pub mod host;
pub mod tab;
pub mod tree;

pub use cache::{MemoryCache, TreeCache, WindowTreeCache, YamlFileCache};
pub use driver::{Delivery, Driver, DriverError, DriverHandle};
pub use engine::{CommandId, Engine, IssuedCommand, Output, Reply};
pub use gateway::{Gateway, GatewayError, RequestId};
pub use host::{
    CommandOutcome, Host, HostCommand, HostError, HostEvent, HostTab, OpenTabRequest, TabChange,
};
pub use tab::{Placement, TabNode, TabRegistry};
pub use tabtree_config::{Config, TabId, WindowId};
