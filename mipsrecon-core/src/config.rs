//! Engine configuration: idle-thread filtering, debug verbosity, the fake-syscall
//! address range, and cooperative cancellation/length-budget knobs, grouped in one
//! struct-of-toggles.

use std::sync::{atomic::AtomicBool, Arc};

/// Default idle thread names: the smaller, always-idle set; `idle0` is opt-in via
/// [`EngineConfig::idle_names`].
pub const DEFAULT_IDLE_NAMES: &[&str] = &["idle1", "SceIoAsync"];

/// Default fake-syscall address range, `[0x08000000, 0x08000040)`.
pub const DEFAULT_FAKE_SYSCALL_RANGE: (u32, u32) = (0x0800_0000, 0x0800_0040);

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub idle_names: Vec<String>,
    /// `0` = quiet, `1` = verbose per-thread `log::debug!` of every enter/leave/
    /// continue transition.
    pub verbosity: u8,
    pub fake_syscall_range: (u32, u32),
    pub cancellation: Arc<AtomicBool>,
    /// Record budget; `None` means unlimited.
    pub length_budget: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_names: DEFAULT_IDLE_NAMES.iter().map(|s| s.to_string()).collect(),
            verbosity: 0,
            fake_syscall_range: DEFAULT_FAKE_SYSCALL_RANGE,
            cancellation: Arc::new(AtomicBool::new(false)),
            length_budget: None,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn is_idle_name(&self, name: &str) -> bool {
        self.idle_names.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn is_fake_syscall_address(&self, addr: u32) -> bool {
        let (start, end) = self.fake_syscall_range;
        (start..end).contains(&addr)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.load(std::sync::atomic::Ordering::Relaxed)
    }
}

// -------------------------------------------------------------------------------------------------
