//! The host collaborator: the external flat tab store.
//!
//! The host owns tab existence and flat order. It reports changes as
//! [`HostEvent`]s and executes the engine's [`HostCommand`]s through the
//! async [`Host`] trait. The engine never assumes a command succeeded until
//! the host says so.

use crate::tab::{PersistentId, Placement};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tabtree_config::{TabId, WindowId};
use thiserror::Error;

/// A tab as reported by the host when it appears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTab {
    pub id: TabId,
    pub window: WindowId,
    /// Flat index within the window at the time of the event
    pub index: usize,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Cookie store / container identity
    #[serde(default)]
    pub partition: String,
    #[serde(default)]
    pub opener: Option<TabId>,
    /// Persistent id carried over by the host's session store, if any
    #[serde(default)]
    pub persistent_id: Option<PersistentId>,
    /// Set when the tab is a duplicate of another live tab
    #[serde(default)]
    pub duplicated_from: Option<TabId>,
    /// Set when the tab was brought back by session restore
    #[serde(default)]
    pub restored: bool,
}

impl HostTab {
    /// Minimal tab description, mostly useful for tests and fakes
    pub fn new(id: TabId, window: WindowId, index: usize, url: impl Into<String>) -> Self {
        Self {
            id,
            window,
            index,
            pinned: false,
            active: false,
            url: url.into(),
            title: String::new(),
            partition: tabtree_config::defaults::default_partition(),
            opener: None,
            persistent_id: None,
            duplicated_from: None,
            restored: false,
        }
    }
}

/// Fields that changed in an `updated` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabChange {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    /// `Some(None)` means the opener was cleared
    #[serde(default)]
    pub opener: Option<Option<TabId>>,
}

/// Events emitted by the host, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// A tab is about to be created in `window`.
    Opening { window: WindowId },
    /// A tab exists.
    Opened { tab: HostTab },
    /// A tab is gone. `window_closing` is set when the whole window closes.
    Closed {
        tab: TabId,
        window: WindowId,
        #[serde(default)]
        window_closing: bool,
    },
    /// A tab is about to move.
    Moving {
        tab: TabId,
        window: WindowId,
        from_index: usize,
        to_index: usize,
    },
    /// A tab moved within its window.
    Moved {
        tab: TabId,
        window: WindowId,
        from_index: usize,
        to_index: usize,
    },
    /// A tab arrived from another window.
    AttachedToWindow {
        tab: TabId,
        window: WindowId,
        index: usize,
    },
    /// A tab left its window for another one.
    DetachedFromWindow { tab: TabId, window: WindowId },
    Pinned { tab: TabId },
    Unpinned { tab: TabId },
    Updated { tab: TabId, change: TabChange },
    /// A tab gained focus.
    Activated { tab: TabId, window: WindowId },
    /// Session restore finished re-creating a window's tabs.
    WindowRestored { window: WindowId },
}

impl HostEvent {
    /// The tab this event is about, if it is about one
    pub fn tab(&self) -> Option<TabId> {
        match self {
            HostEvent::Opened { tab } => Some(tab.id),
            HostEvent::Closed { tab, .. }
            | HostEvent::Moving { tab, .. }
            | HostEvent::Moved { tab, .. }
            | HostEvent::AttachedToWindow { tab, .. }
            | HostEvent::DetachedFromWindow { tab, .. }
            | HostEvent::Pinned { tab }
            | HostEvent::Unpinned { tab }
            | HostEvent::Updated { tab, .. }
            | HostEvent::Activated { tab, .. } => Some(*tab),
            HostEvent::Opening { .. } | HostEvent::WindowRestored { .. } => None,
        }
    }
}

/// Parameters for opening a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTabRequest {
    pub window: WindowId,
    pub url: String,
    /// Where to put the tab; `None` lets the host decide
    pub placement: Option<Placement>,
    pub opener: Option<TabId>,
    pub partition: Option<String>,
    /// Open in the foreground
    pub active: bool,
}

/// A host call the engine wants executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// Move `tabs` (in order) next to an anchor, possibly into another window.
    Move {
        tabs: Vec<TabId>,
        window: WindowId,
        placement: Placement,
    },
    Open(OpenTabRequest),
    Close { tab: TabId },
    Activate { tab: TabId },
    SetOpener { tab: TabId, opener: Option<TabId> },
}

impl HostCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            HostCommand::Move { .. } => "move",
            HostCommand::Open(_) => "open",
            HostCommand::Close { .. } => "close",
            HostCommand::Activate { .. } => "activate",
            HostCommand::SetOpener { .. } => "set_opener",
        }
    }
}

/// Successful result of a host call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    Opened(TabId),
}

/// Why the host refused a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("tab {0} does not exist")]
    TabMissing(TabId),
    #[error("window {0} does not exist")]
    WindowMissing(WindowId),
    #[error("host rejected the call: {0}")]
    Rejected(String),
}

/// The host tab store, as seen from the engine.
///
/// Implementations perform the call and resolve once the host has applied
/// it. Events caused by the call may be delivered before or after the
/// future resolves.
pub trait Host: Send + Sync + 'static {
    fn move_tabs(
        &self,
        tabs: Vec<TabId>,
        window: WindowId,
        placement: Placement,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    fn open_tab(
        &self,
        request: OpenTabRequest,
    ) -> impl Future<Output = Result<TabId, HostError>> + Send;

    fn close_tab(&self, tab: TabId) -> impl Future<Output = Result<(), HostError>> + Send;

    fn activate_tab(&self, tab: TabId) -> impl Future<Output = Result<(), HostError>> + Send;

    fn set_opener(
        &self,
        tab: TabId,
        opener: Option<TabId>,
    ) -> impl Future<Output = Result<(), HostError>> + Send;
}

/// Execute one command against a host.
pub async fn execute<H: Host>(host: &H, command: HostCommand) -> Result<CommandOutcome, HostError> {
    match command {
        HostCommand::Move {
            tabs,
            window,
            placement,
        } => host
            .move_tabs(tabs, window, placement)
            .await
            .map(|_| CommandOutcome::Done),
        HostCommand::Open(request) => host.open_tab(request).await.map(CommandOutcome::Opened),
        HostCommand::Close { tab } => host.close_tab(tab).await.map(|_| CommandOutcome::Done),
        HostCommand::Activate { tab } => {
            host.activate_tab(tab).await.map(|_| CommandOutcome::Done)
        }
        HostCommand::SetOpener { tab, opener } => host
            .set_opener(tab, opener)
            .await
            .map(|_| CommandOutcome::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tab_accessor() {
        let event = HostEvent::Moved {
            tab: 3,
            window: 1,
            from_index: 0,
            to_index: 2,
        };
        assert_eq!(event.tab(), Some(3));
        assert_eq!(HostEvent::WindowRestored { window: 1 }.tab(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let event = HostEvent::Opened {
            tab: HostTab::new(5, 1, 0, "https://example.com/"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "opened");
        assert_eq!(json["tab"]["id"], 5);

        let parsed: HostEvent =
            serde_json::from_str(r#"{"type":"closed","tab":5,"window":1}"#).unwrap();
        assert_eq!(
            parsed,
            HostEvent::Closed {
                tab: 5,
                window: 1,
                window_closing: false
            }
        );
    }

    #[test]
    fn test_host_error_display() {
        assert_eq!(HostError::TabMissing(4).to_string(), "tab 4 does not exist");
    }
}
