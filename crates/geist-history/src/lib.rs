//! Undo/redo history for block edits, plus the per-player session that
//! ties history, selection, gradients and clipboard together.
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod history;
pub mod host;
pub mod point;
pub mod ring;
pub mod selection;
pub mod session;

pub use config::HistoryConfig;
pub use error::{HistoryError, Result};
pub use history::{History, HistoryTask, OnceTask, ready};
pub use host::{HostHistory, HostTransactions};
pub use point::{PointId, ThreadKey};
pub use ring::RingHistory;
pub use selection::{Selection, SelectionMode, SharedSelection};
pub use session::Session;
