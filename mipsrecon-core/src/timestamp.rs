//! Monotonic timestamp newtypes: `Nts` stamps every trace record with its
//! per-instruction record index, and `Fts` stamps every call-history cell opened
//! in [`crate::callgraph::CallHistory`]. Both are a bare `u64` counter with the same
//! shape -- generated once from a shared `duplicate!` template rather than
//! hand-copied twice.

use std::fmt;

use duplicate::duplicate_item;

#[duplicate_item(ts_type; [Nts]; [Fts];)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ts_type(u64);

#[duplicate_item(ts_type; [Nts]; [Fts];)]
impl ts_type {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// The value one past this one, for stamping a cell's initial `stop_ts`/`fts_stop`.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the current value, then advances the counter by one.
    pub fn post_increment(&mut self) -> Self {
        let current = *self;
        self.0 += 1;
        current
    }

    /// Advances the counter by one in place.
    pub fn advance(&mut self) {
        self.0 += 1;
    }
}

#[duplicate_item(ts_type; [Nts]; [Fts];)]
impl fmt::Display for ts_type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[duplicate_item(ts_type; [Nts]; [Fts];)]
impl From<u64> for ts_type {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
