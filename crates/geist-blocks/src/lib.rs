//! Block palette: permutations, typed state schemas, and the registry.
#![forbid(unsafe_code)]

pub mod config;
pub mod registry;
pub mod types;

pub use registry::{BlockRegistry, BlockType, PERSISTENT_BIT, StateError, StateField};
pub use types::{Block, BlockId, BlockState, StateKind, StateValue};
