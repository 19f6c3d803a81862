//! BGM ducking state
//!
//! Ducking is owned by one effect generation at a time. Only the owner (or a
//! global stop) may restore, and restoring twice is a no-op, so the end
//! watcher and the fallback timer can both fire safely.

/// Nominal BGM volume plus the current duck owner
#[derive(Debug, Clone, PartialEq)]
pub struct DuckState {
    nominal: f32,
    ratio: f32,
    owner: Option<u64>,
}

impl DuckState {
    pub fn new(nominal: f32, ratio: f32) -> Self {
        Self {
            nominal: nominal.clamp(0.0, 1.0),
            ratio: ratio.clamp(0.0, 1.0),
            owner: None,
        }
    }

    /// Duck on behalf of `owner`. Returns true if BGM was not ducked before.
    pub fn duck(&mut self, owner: u64) -> bool {
        let newly = self.owner.is_none();
        self.owner = Some(owner);
        newly
    }

    /// Restore if `owner` still owns the duck. Returns true if this call restored.
    pub fn restore(&mut self, owner: u64) -> bool {
        if self.owner == Some(owner) {
            self.owner = None;
            true
        } else {
            false
        }
    }

    /// Restore regardless of owner
    pub fn restore_any(&mut self) -> bool {
        self.owner.take().is_some()
    }

    /// Hand an active duck to a newer generation
    pub fn transfer(&mut self, owner: u64) {
        if self.owner.is_some() {
            self.owner = Some(owner);
        }
    }

    /// Set the pre-duck volume; while ducked the effective volume follows it
    pub fn set_nominal(&mut self, volume: f32) {
        self.nominal = volume.clamp(0.0, 1.0);
    }

    pub fn nominal(&self) -> f32 {
        self.nominal
    }

    /// Volume the BGM handle should have right now
    pub fn effective(&self) -> f32 {
        if self.is_ducked() {
            self.nominal * self.ratio
        } else {
            self.nominal
        }
    }

    pub fn is_ducked(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<u64> {
        self.owner
    }
}
