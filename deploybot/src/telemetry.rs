//! Process telemetry

use serde::{Deserialize, Serialize};
use sysinfo::{ProcessesToUpdate, System};

/// Process resource usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMetrics {
    /// Resident memory of this process in megabytes
    pub memory_mb: f64,

    /// Total system memory in megabytes
    pub system_memory_mb: f64,

    /// Hostname
    pub hostname: String,
}

const MB: f64 = 1024.0 * 1024.0;

/// Collect resource usage for the running process
pub fn collect_metrics() -> ProcessMetrics {
    let mut sys = System::new();
    sys.refresh_memory();

    let memory_bytes = match sysinfo::get_current_pid() {
        Ok(pid) => {
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            sys.process(pid).map(|process| process.memory()).unwrap_or(0)
        }
        Err(_) => 0,
    };

    ProcessMetrics {
        memory_mb: round2(memory_bytes as f64 / MB),
        system_memory_mb: round2(sys.total_memory() as f64 / MB),
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
