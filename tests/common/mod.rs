//! Shared integration test helpers for tabtree.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::{WINDOW, engine_with_tree, parent};
//! ```
//!
//! Rust integration tests pull this in with `mod common;`. The
//! `#![allow(dead_code)]` below keeps files that use only some helpers quiet.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tabtree::host::{Host, HostCommand, HostError, HostEvent, HostTab, OpenTabRequest};
use tabtree::tab::Placement;
use tabtree::{Config, Engine, Output, TabId, WindowId};
use tokio::time::Instant;

/// Window every helper opens tabs in
pub const WINDOW: WindowId = 1;

/// Default config without burst grouping, so single-step scenarios don't
/// leave timers behind.
pub fn quiet_config() -> Config {
    Config {
        auto_group_new_tabs: false,
        ..Config::default()
    }
}

/// A plain tab at `index` with a URL derived from its id
pub fn host_tab(id: TabId, index: usize, opener: Option<TabId>) -> HostTab {
    let mut tab = HostTab::new(id, WINDOW, index, format!("https://example.com/{id}"));
    tab.opener = opener;
    tab
}

pub fn open(engine: &mut Engine, id: TabId, index: usize, opener: Option<TabId>) -> Output {
    engine.handle_event(
        HostEvent::Opened {
            tab: host_tab(id, index, opener),
        },
        Instant::now(),
    )
}

/// Open tabs in order, each at the end of the strip; `(id, opener)` pairs.
///
/// Openers become parents through auto-attach, so the tree ends up as the
/// links describe as long as every child is listed after its subtree's
/// earlier members.
pub fn engine_with_tree(config: Config, tabs: &[(TabId, Option<TabId>)]) -> Engine {
    let mut engine = Engine::new(config);
    for (index, &(id, opener)) in tabs.iter().enumerate() {
        open(&mut engine, id, index, opener);
    }
    engine
}

/// Report a foreign move of `tab` from one index to another
pub fn moved(engine: &mut Engine, tab: TabId, from_index: usize, to_index: usize) -> Output {
    engine.handle_event(
        HostEvent::Moved {
            tab,
            window: WINDOW,
            from_index,
            to_index,
        },
        Instant::now(),
    )
}

pub fn parent(engine: &Engine, id: TabId) -> Option<TabId> {
    engine.registry().get(id).and_then(|node| node.parent())
}

pub fn children(engine: &Engine, id: TabId) -> Vec<TabId> {
    engine
        .registry()
        .get(id)
        .map(|node| node.children().to_vec())
        .unwrap_or_default()
}

pub fn order(engine: &Engine) -> Vec<TabId> {
    engine.registry().tabs_in_window(WINDOW)
}

/// Host fake that records every call and hands out fresh ids for opens.
#[derive(Debug)]
pub struct FakeHost {
    calls: Mutex<Vec<HostCommand>>,
    finished: Mutex<Vec<HostCommand>>,
    first_tab: TabId,
    next_tab: AtomicU64,
    reject_moves: bool,
    slow_first_open: bool,
}

impl FakeHost {
    /// Opened tabs get ids starting at `first_tab`
    pub fn new(first_tab: TabId) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            first_tab,
            next_tab: AtomicU64::new(first_tab),
            reject_moves: false,
            slow_first_open: false,
        }
    }

    pub fn rejecting_moves(first_tab: TabId) -> Self {
        Self {
            reject_moves: true,
            ..Self::new(first_tab)
        }
    }

    /// The first open takes a while to complete
    pub fn with_slow_first_open(first_tab: TabId) -> Self {
        Self {
            slow_first_open: true,
            ..Self::new(first_tab)
        }
    }

    /// Calls in the order they started
    pub fn calls(&self) -> Vec<HostCommand> {
        self.calls.lock().clone()
    }

    /// Opens in the order they completed
    pub fn finished_opens(&self) -> Vec<OpenTabRequest> {
        self.finished
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCommand::Open(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Host for FakeHost {
    async fn move_tabs(
        &self,
        tabs: Vec<TabId>,
        window: WindowId,
        placement: Placement,
    ) -> Result<(), HostError> {
        self.calls.lock().push(HostCommand::Move {
            tabs,
            window,
            placement,
        });
        if self.reject_moves {
            return Err(HostError::Rejected("moves disabled".to_string()));
        }
        Ok(())
    }

    async fn open_tab(&self, request: OpenTabRequest) -> Result<TabId, HostError> {
        let id = self.next_tab.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(HostCommand::Open(request.clone()));
        if self.slow_first_open && id == self.first_tab {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.finished.lock().push(HostCommand::Open(request));
        Ok(id)
    }

    async fn close_tab(&self, tab: TabId) -> Result<(), HostError> {
        self.calls.lock().push(HostCommand::Close { tab });
        Ok(())
    }

    async fn activate_tab(&self, tab: TabId) -> Result<(), HostError> {
        self.calls.lock().push(HostCommand::Activate { tab });
        Ok(())
    }

    async fn set_opener(&self, tab: TabId, opener: Option<TabId>) -> Result<(), HostError> {
        self.calls.lock().push(HostCommand::SetOpener { tab, opener });
        Ok(())
    }
}
