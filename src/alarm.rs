use log::warn;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Whatever actually makes the noise.
pub trait AlarmSink: Send + Sync {
    fn trigger(&self);
}

/// Rings the terminal bell a few times.
#[derive(Debug, Clone)]
pub struct TerminalBell {
    rings: usize,
}

impl TerminalBell {
    pub fn new(rings: usize) -> Self {
        Self { rings: rings.max(1) }
    }
}

impl Default for TerminalBell {
    fn default() -> Self {
        Self::new(3)
    }
}

impl AlarmSink for TerminalBell {
    fn trigger(&self) {
        let mut stdout = std::io::stdout().lock();
        let bell = "\x07".repeat(self.rings);
        if let Err(e) = writeln!(stdout, "{}WAKE UP", bell).and_then(|_| stdout.flush()) {
            warn!("Could not ring terminal bell: {}", e);
        }
    }
}

/// Counts triggers instead of making noise.
#[derive(Debug, Default)]
pub struct CountingAlarm {
    triggered: AtomicUsize,
}

impl CountingAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl AlarmSink for CountingAlarm {
    fn trigger(&self) {
        self.triggered.fetch_add(1, Ordering::SeqCst);
    }
}
