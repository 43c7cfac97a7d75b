//! Host resource detection

use sysinfo::{Disks, System};
use tracing::info;
use workmesh_shared::ResourceVector;

/// Fill zero-valued components of the configured resource vector from
/// the host: logical cores, total memory and total disk capacity. GPUs
/// have no portable detection and stay as configured.
pub fn detect_resources(configured: ResourceVector) -> ResourceVector {
    if configured.cpu > 0.0 && configured.memory > 0 && configured.storage > 0 {
        return configured;
    }

    let system = System::new_all();
    let mut detected = configured;

    if detected.cpu == 0.0 {
        detected.cpu = system.cpus().len() as f64;
    }
    if detected.memory == 0 {
        detected.memory = system.total_memory();
    }
    if detected.storage == 0 {
        let disks = Disks::new_with_refreshed_list();
        detected.storage = disks.list().iter().map(|d| d.total_space()).sum();
    }

    info!("host resources detected: {}", detected);
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_configured_vector_is_untouched() {
        let configured = ResourceVector::new(2.0, 1, 4 << 30, 100 << 30);
        assert_eq!(detect_resources(configured), configured);
    }

    #[test]
    fn test_zero_components_are_filled() {
        let detected = detect_resources(ResourceVector::ZERO);
        assert!(detected.cpu >= 1.0);
        assert!(detected.memory > 0);
    }
}
