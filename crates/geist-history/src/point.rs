use std::fmt;

/// Identifies one recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointId(pub u64);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle of a logical thread of edits (a brush stroke, a command).
/// Each thread may hold one open point at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ThreadKey(pub u64);

impl ThreadKey {
    pub const MAIN: ThreadKey = ThreadKey(0);
}
