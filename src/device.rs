//! Device classification and the downscale/threshold policy derived from it.
//!
//! Small NVR boxes (sub-512 MB RAM or one/two cores) get more aggressive
//! preprocessing; when available memory gets critically low the CNN
//! downscale factor escalates further on the next cycle.

use std::fs;
use std::thread;

use crate::config::PolicySettings;
use crate::model::BackendKind;

const EMBEDDED_TOTAL_MEM_KB: u64 = 512 * 1024;
const EMBEDDED_MAX_CORES: usize = 2;
pub const CRITICAL_LOW_MEM_KB: u64 = 50 * 1024;
const CRITICAL_LOW_DOWNSCALE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Embedded,
    Standard,
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub class: DeviceClass,
    pub total_mem_kb: u64,
    pub cores: usize,
}

impl DeviceProfile {
    /// Probe `/proc/meminfo` and the scheduler once at startup.
    pub fn detect() -> DeviceProfile {
        let total_mem_kb = meminfo_field("MemTotal:").unwrap_or(0);
        let cores = thread::available_parallelism().map(usize::from).unwrap_or(1);
        let class = if (total_mem_kb > 0 && total_mem_kb < EMBEDDED_TOTAL_MEM_KB)
            || cores <= EMBEDDED_MAX_CORES
        {
            DeviceClass::Embedded
        } else {
            DeviceClass::Standard
        };
        if class == DeviceClass::Embedded {
            log::info!(
                "device: embedded profile ({} KB RAM, {} cores)",
                total_mem_kb,
                cores
            );
        }
        DeviceProfile {
            class,
            total_mem_kb,
            cores,
        }
    }

    pub fn standard() -> DeviceProfile {
        DeviceProfile {
            class: DeviceClass::Standard,
            total_mem_kb: 0,
            cores: 4,
        }
    }

    pub fn embedded() -> DeviceProfile {
        DeviceProfile {
            class: DeviceClass::Embedded,
            total_mem_kb: 256 * 1024,
            cores: 2,
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.class == DeviceClass::Embedded
    }
}

/// Currently available memory in KB, `None` when unreadable.
pub fn available_memory_kb() -> Option<u64> {
    meminfo_field("MemAvailable:")
}

fn meminfo_field(field: &str) -> Option<u64> {
    let text = fs::read_to_string("/proc/meminfo").ok()?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(field) {
            return rest
                .trim()
                .split_whitespace()
                .next()
                .and_then(|v| v.parse().ok());
        }
    }
    None
}

/// Downscale factor for one cycle. `available_kb` is sampled per cycle so
/// the low-memory escalation reacts to current pressure, and injectable so
/// tests control it.
pub fn downscale_factor(
    policy: &PolicySettings,
    profile: &DeviceProfile,
    kind: BackendKind,
    available_kb: Option<u64>,
) -> u32 {
    let base = match kind {
        BackendKind::Cnn => policy.downscale_factor_cnn,
        BackendKind::RealNet => policy.downscale_factor_realnet,
        _ => policy.downscale_factor_default,
    };
    if profile.is_embedded() && kind == BackendKind::Cnn {
        if let Some(avail) = available_kb {
            if avail > 0 && avail < CRITICAL_LOW_MEM_KB {
                log::warn!(
                    "device: {} KB available, escalating CNN downscale to {}",
                    avail,
                    CRITICAL_LOW_DOWNSCALE
                );
                return base.max(CRITICAL_LOW_DOWNSCALE);
            }
        }
    }
    base
}

/// Effective confidence threshold: a configured positive value wins, then
/// per-kind policy defaults (embedded devices may carry a separate CNN
/// threshold).
pub fn effective_threshold(
    policy: &PolicySettings,
    profile: &DeviceProfile,
    kind: BackendKind,
    configured: f32,
) -> f32 {
    if configured > 0.0 {
        return configured;
    }
    match kind {
        BackendKind::RealNet => policy.threshold_realnet,
        BackendKind::Cnn if profile.is_embedded() => policy.threshold_cnn_embedded,
        BackendKind::Cnn => policy.threshold_cnn,
        _ => kind.default_threshold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_memory_escalates_cnn_downscale_on_embedded() {
        let policy = PolicySettings::default();
        let embedded = DeviceProfile::embedded();
        assert_eq!(
            downscale_factor(&policy, &embedded, BackendKind::Cnn, Some(40 * 1024)),
            4
        );
        assert_eq!(
            downscale_factor(&policy, &embedded, BackendKind::Cnn, Some(200 * 1024)),
            policy.downscale_factor_cnn
        );
        // No escalation off the embedded profile or for RealNet.
        let standard = DeviceProfile::standard();
        assert_eq!(
            downscale_factor(&policy, &standard, BackendKind::Cnn, Some(40 * 1024)),
            policy.downscale_factor_cnn
        );
        assert_eq!(
            downscale_factor(&policy, &embedded, BackendKind::RealNet, Some(40 * 1024)),
            policy.downscale_factor_realnet
        );
    }

    #[test]
    fn configured_threshold_wins() {
        let policy = PolicySettings::default();
        let profile = DeviceProfile::standard();
        assert_eq!(
            effective_threshold(&policy, &profile, BackendKind::Cnn, 0.7),
            0.7
        );
        assert_eq!(
            effective_threshold(&policy, &profile, BackendKind::Cnn, 0.0),
            policy.threshold_cnn
        );
        assert_eq!(
            effective_threshold(&policy, &profile, BackendKind::RealNet, 0.0),
            policy.threshold_realnet
        );
    }
}
