//! Exit reaping and memory accounting for module processes.

use crate::bus::BusMessage;
use crate::models::constants::{CONTINUE_EXECUTION_EXIT_CODE, MEMORY_WARNING_PERCENT};
use crate::process::ProcessExit;

use super::Supervisor;

const KB: u64 = 1024;
const MB: u64 = 1024 * 1024;

impl Supervisor {
    /// Collect every module process that has exited since the last call.
    pub fn reap_exited(&mut self) {
        let mut exited = Vec::new();
        for (name, record) in self.modules.iter_mut() {
            let Some(process) = record.process.as_mut() else {
                continue;
            };
            if let Some(exit) = process.poll_exit() {
                record.process = None;
                exited.push((name.clone(), exit));
            }
        }

        for (name, exit) in exited {
            self.on_module_exited(&name, exit);
        }
    }

    fn on_module_exited(&mut self, name: &str, exit: ProcessExit) {
        if !self.modules.values().any(|record| record.is_running()) {
            self.screen_protection = true;
        }
        self.check_screen_protection();

        if exit.crashed() {
            tracing::warn!("Module {name} has crashed with {exit}.");
        } else {
            tracing::warn!("Module {name} has exited with {exit}.");
        }

        if exit.code != Some(CONTINUE_EXECUTION_EXIT_CODE) {
            self.publish(BusMessage::module_closed(name));
        }

        self.presentation.clear_state(name);
    }

    /// Sample the memory of every running module against its baseline and
    /// log the host's physical memory.
    pub fn check_process_memory(&mut self) {
        for record in self.modules.values_mut() {
            let Some(pid) = record.pid().filter(|_| record.is_running()) else {
                continue;
            };
            let Some(size) = self.host.process_memory(pid) else {
                continue;
            };

            let Some(baseline) = record.memory_baseline else {
                record.memory_baseline = Some(size);
                tracing::info!(
                    "Module {} memory baseline: {} Kb.",
                    record.name,
                    size / KB
                );
                continue;
            };

            let diff = size as i64 - baseline as i64;
            let percent = if baseline > 0 {
                diff.unsigned_abs() as f64 * 100.0 / baseline as f64
            } else {
                0.0
            };

            if percent >= MEMORY_WARNING_PERCENT {
                tracing::warn!(
                    "Module {} uses {} Kb ({:+} Kb, {percent:.1}%).",
                    record.name,
                    size / KB,
                    diff / KB as i64
                );
            } else {
                tracing::info!(
                    "Module {} uses {} Kb ({:+} Kb).",
                    record.name,
                    size / KB,
                    diff / KB as i64
                );
            }
        }

        if let Some(memory) = self.host.system_memory() {
            tracing::info!(
                "Physical memory: total {} Mb, used {} Mb.",
                memory.total / MB,
                memory.used / MB
            );
        }
    }
}
