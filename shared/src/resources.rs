//! Resource vectors for capacity accounting

use serde::{Deserialize, Serialize};
use std::fmt;

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// A vector of node resources: fractional cores, discrete GPUs, bytes of
/// memory and bytes of storage
///
/// All arithmetic is componentwise. Subtraction saturates at zero so a
/// double release cannot drive the ledger negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceVector {
    /// Fractional CPU cores
    #[serde(default)]
    pub cpu: f64,

    /// Discrete GPU devices
    #[serde(default)]
    pub gpu: u64,

    /// Memory in bytes
    #[serde(default)]
    pub memory: u64,

    /// Storage in bytes
    #[serde(default)]
    pub storage: u64,
}

impl ResourceVector {
    pub const ZERO: Self = Self {
        cpu: 0.0,
        gpu: 0,
        memory: 0,
        storage: 0,
    };

    pub fn new(cpu: f64, gpu: u64, memory: u64, storage: u64) -> Self {
        Self {
            cpu,
            gpu,
            memory,
            storage,
        }
    }

    /// Componentwise addition
    pub fn add(&self, other: &Self) -> Self {
        Self {
            cpu: self.cpu + other.cpu,
            gpu: self.gpu + other.gpu,
            memory: self.memory + other.memory,
            storage: self.storage + other.storage,
        }
    }

    /// Componentwise subtraction, saturating at zero
    pub fn saturating_sub(&self, other: &Self) -> Self {
        Self {
            cpu: (self.cpu - other.cpu).max(0.0),
            gpu: self.gpu.saturating_sub(other.gpu),
            memory: self.memory.saturating_sub(other.memory),
            storage: self.storage.saturating_sub(other.storage),
        }
    }

    /// True when every component of `self` fits within `avail`
    pub fn fits(&self, avail: &Self) -> bool {
        self.cpu <= avail.cpu
            && self.gpu <= avail.gpu
            && self.memory <= avail.memory
            && self.storage <= avail.storage
    }

    /// L1 norm of the slack `self − req`, with byte-valued components
    /// scaled to GiB so cores, devices and bytes are comparable
    pub fn slack_l1(&self, req: &Self) -> f64 {
        let rem = self.saturating_sub(req);
        rem.cpu
            + rem.gpu as f64
            + rem.memory as f64 / BYTES_PER_GIB
            + rem.storage as f64 / BYTES_PER_GIB
    }

    pub fn is_zero(&self) -> bool {
        self.cpu == 0.0 && self.gpu == 0 && self.memory == 0 && self.storage == 0
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={} gpu={} memory={} storage={}",
            self.cpu, self.gpu, self.memory, self.storage
        )
    }
}
