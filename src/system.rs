//! Host-level actions: reboot, power off, memory usage.

use std::process::Command;

use anyhow::{bail, Context, Result};
use sysinfo::{CpuRefreshKind, Pid, ProcessesToUpdate, RefreshKind, System};

/// Physical memory of the host, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total: u64,
    pub used: u64,
}

pub trait Host: Send {
    fn reboot(&mut self) -> Result<()>;
    fn shutdown(&mut self) -> Result<()>;

    /// Resident memory of a process in bytes, `None` when it is gone.
    fn process_memory(&mut self, pid: u32) -> Option<u64>;

    fn system_memory(&mut self) -> Option<MemoryInfo>;
}

/// The machine the supervisor runs on.
pub struct OsHost {
    system: System,
}

impl OsHost {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for OsHost {
    fn default() -> Self {
        Self::new()
    }
}

fn systemctl(action: &str) -> Result<()> {
    let status = Command::new("systemctl")
        .arg(action)
        .status()
        .with_context(|| format!("Failed to run systemctl {action}"))?;
    if !status.success() {
        bail!("systemctl {action} failed with {status}");
    }
    Ok(())
}

impl Host for OsHost {
    fn reboot(&mut self) -> Result<()> {
        systemctl("reboot")
    }

    fn shutdown(&mut self) -> Result<()> {
        systemctl("poweroff")
    }

    fn process_memory(&mut self, pid: u32) -> Option<u64> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|process| process.memory())
    }

    fn system_memory(&mut self) -> Option<MemoryInfo> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return None;
        }
        Some(MemoryInfo {
            total,
            used: self.system.used_memory(),
        })
    }
}

/// Speed of the first CPU in MHz, if the platform reports it.
pub fn cpu_speed_mhz() -> Option<u64> {
    let system = System::new_with_specifics(
        RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_frequency()),
    );
    system
        .cpus()
        .first()
        .map(|cpu| cpu.frequency())
        .filter(|&mhz| mhz > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_memory_is_reported() {
        let mut host = OsHost::new();
        let memory = host.process_memory(std::process::id());
        assert!(memory.is_some_and(|bytes| bytes > 0));
    }

    #[test]
    fn test_missing_process_has_no_memory() {
        let mut host = OsHost::new();
        assert_eq!(host.process_memory(999_999_999), None);
    }

    #[test]
    fn test_system_memory_is_consistent() {
        let mut host = OsHost::new();
        if let Some(info) = host.system_memory() {
            assert!(info.used <= info.total);
        }
    }
}
