//! JSON message contracts for the tabtree engine.
//!
//! Three families of messages cross the engine boundary:
//!
//! - [`ExternalRequest`] / [`ExternalResponse`]: the control surface offered to
//!   third-party collaborators (read/mutate the tree, hold locks).
//! - [`InternalMessage`] / [`InternalResponse`]: requests from the engine's own
//!   presentation layer (pull structure, collapse, move, open).
//! - [`TreeNotification`]: fire-and-forget state changes the presentation layer
//!   reacts to.
//!
//! All payloads are internally tagged with `type` for easy JSON dispatch.

pub mod external;
pub mod internal;
pub mod notification;
pub mod structure;
pub mod target;

pub use external::{ExternalRequest, ExternalResponse, SerializedTab, StateList};
pub use internal::{CollaboratorInfo, InternalMessage, InternalResponse};
pub use notification::{CollapseCause, TreeNotification};
pub use structure::{PersistentId, TreeStructure, TreeStructureEntry};
pub use target::{TabRef, TabsRef, TargetSpec};

pub use tabtree_config::{TabId, WindowId};
