//! Simulated GPIO driver with edge subscription.
//!
//! Mirrors the subset of a real pin driver the supervisor needs: input
//! configuration with pull selection, level reads, and an edge-triggered
//! callback fired from the driving thread ("GPIO interrupt context").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Input pull configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

/// Pin mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinMode {
    /// Unconfigured, high impedance.
    #[default]
    HighZ,
    /// Digital input with the given pull.
    Input(Pull),
}

type EdgeCallback = Box<dyn Fn() + Send + Sync>;

struct Subscription {
    rising: bool,
    falling: bool,
    callback: EdgeCallback,
}

/// One simulated pin.
pub struct SimGpio {
    num: u32,
    level: AtomicBool,
    mode: Mutex<PinMode>,
    subscription: Mutex<Option<Subscription>>,
}

impl std::fmt::Debug for SimGpio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimGpio")
            .field("num", &self.num)
            .field("level", &self.level.load(Ordering::Relaxed))
            .finish()
    }
}

impl SimGpio {
    pub fn new(num: u32) -> Self {
        Self {
            num,
            level: AtomicBool::new(false),
            mode: Mutex::new(PinMode::HighZ),
            subscription: Mutex::new(None),
        }
    }

    fn mode_guard(&self) -> MutexGuard<'_, PinMode> {
        self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sub_guard(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    /// Configure the pin. Pull-down inputs settle low, pull-ups high.
    pub fn init(&self, mode: PinMode) {
        *self.mode_guard() = mode;
        if let PinMode::Input(pull) = mode {
            match pull {
                Pull::Down => self.level.store(false, Ordering::SeqCst),
                Pull::Up => self.level.store(true, Ordering::SeqCst),
                Pull::None => {}
            }
        }
    }

    /// Return the pin to high impedance and drop any edge subscription.
    pub fn deinit(&self) {
        *self.sub_guard() = None;
        *self.mode_guard() = PinMode::HighZ;
    }

    /// Current level.
    pub fn read(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Subscribe an edge callback. Replaces any existing subscription.
    pub fn subscribe<F>(&self, rising: bool, falling: bool, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.sub_guard() = Some(Subscription {
            rising,
            falling,
            callback: Box::new(callback),
        });
    }

    /// Drive the pin from the outside world. Fires the subscribed
    /// callback on a matching edge, in the caller's context.
    pub fn drive(&self, level: bool) {
        let prev = self.level.swap(level, Ordering::SeqCst);
        if prev == level {
            return;
        }
        let guard = self.sub_guard();
        if let Some(sub) = guard.as_ref() {
            if (level && sub.rising) || (!level && sub.falling) {
                (sub.callback)();
            }
        }
    }
}

/// The board's pin bank.
#[derive(Debug)]
pub struct GpioBank {
    pins: Vec<Arc<SimGpio>>,
}

impl GpioBank {
    /// Create a bank of `count` pins numbered from 0.
    pub fn new(count: u32) -> Self {
        Self {
            pins: (0..count).map(|n| Arc::new(SimGpio::new(n))).collect(),
        }
    }

    /// Look up a pin by number.
    pub fn get(&self, num: u32) -> Option<Arc<SimGpio>> {
        self.pins.get(num as usize).cloned()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
