//! C4 — check dispatcher.
//!
//! Every check is a child process; its stdout/exit code constitute the
//! result. Spawn, await, and synthesize an execution record even on
//! failure or timeout rather than letting the caller unwrap.

use centinel_core::state::{ActiveOrPassive, CheckResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

/// A launched-or-synthesized check outcome. `is_executed = false` marks the
/// fork/exec-failure case (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct DispatchedResult {
    pub result: CheckResult,
    pub is_executed: bool,
    pub latency_secs: f64,
    pub execution_time_secs: f64,
}

/// Runs `command_line` through the shell, enforcing `timeout`. An empty
/// command line is the "assumed UP" shortcut for active host checks (spec.md
/// §4.4): callers are expected to special-case that before calling this.
pub async fn run_check(command_line: &str, timeout_duration: Duration) -> DispatchedResult {
    let start = chrono::Utc::now();
    let launch_start = std::time::Instant::now();

    let spawn_result = Command::new("/bin/sh")
        .arg("-c")
        .arg(command_line)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawn_result {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "failed to launch check command");
            let end = chrono::Utc::now();
            return DispatchedResult {
                result: CheckResult {
                    source: ActiveOrPassive::Active,
                    start,
                    end,
                    exit_code: 2,
                    early_timeout: false,
                    exited_ok: false,
                    stdout: format!("(Could not execute check: {e})"),
                },
                is_executed: false,
                latency_secs: 0.0,
                execution_time_secs: 0.0,
            };
        }
    };

    let latency_secs = launch_start.elapsed().as_secs_f64();
    let exec_start = std::time::Instant::now();

    let output = timeout(timeout_duration, child.wait_with_output()).await;
    let execution_time_secs = exec_start.elapsed().as_secs_f64();
    let end = chrono::Utc::now();

    match output {
        Ok(Ok(output)) => {
            let exit_code = output.status.code().unwrap_or(-1);
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let coerced = coerce_exit_code(exit_code, &stdout);
            DispatchedResult {
                result: CheckResult {
                    source: ActiveOrPassive::Active,
                    start,
                    end,
                    exit_code: coerced.0,
                    early_timeout: false,
                    exited_ok: output.status.success() || coerced.0 != exit_code,
                    stdout: coerced.1,
                },
                is_executed: true,
                latency_secs,
                execution_time_secs,
            }
        }
        Ok(Err(e)) => DispatchedResult {
            result: CheckResult {
                source: ActiveOrPassive::Active,
                start,
                end,
                exit_code: 2,
                early_timeout: false,
                exited_ok: false,
                stdout: format!("(Could not execute check: {e})"),
            },
            is_executed: false,
            latency_secs,
            execution_time_secs: 0.0,
        },
        Err(_) => DispatchedResult {
            result: CheckResult {
                source: ActiveOrPassive::Active,
                start,
                end,
                exit_code: 2,
                early_timeout: true,
                exited_ok: false,
                stdout: "(Process Timeout)".to_string(),
            },
            is_executed: true,
            latency_secs,
            execution_time_secs,
        },
    }
}

/// Out-of-bounds exit codes become UNKNOWN with a synthesized message
/// (spec.md §4.4), special-casing 126/127 as "plugin may be missing".
fn coerce_exit_code(exit_code: i32, stdout: &str) -> (i32, String) {
    match exit_code {
        0 | 1 | 2 | 3 => (exit_code, stdout.to_string()),
        126 | 127 => (
            3,
            format!("(Return code of {exit_code} is out of bounds - plugin may be missing)"),
        ),
        other => (
            3,
            format!("(Return code of {other} is out of bounds - plugin returned an invalid status)"),
        ),
    }
}

/// Tracks in-flight check counts for the concurrency cap (spec.md §4.4):
/// service checks are capped, host checks are not (but still counted).
#[derive(Debug, Default)]
pub struct InFlightTracker {
    service_checks: usize,
    host_checks: usize,
}

impl InFlightTracker {
    pub fn try_start_service_check(&mut self, max_parallel: usize) -> bool {
        if max_parallel != 0 && self.service_checks >= max_parallel {
            return false;
        }
        self.service_checks += 1;
        true
    }

    pub fn finish_service_check(&mut self) {
        self.service_checks = self.service_checks.saturating_sub(1);
    }

    pub fn start_host_check(&mut self) {
        self.host_checks += 1;
    }

    pub fn finish_host_check(&mut self) {
        self.host_checks = self.host_checks.saturating_sub(1);
    }

    pub fn service_checks_in_flight(&self) -> usize {
        self.service_checks
    }
    pub fn host_checks_in_flight(&self) -> usize {
        self.host_checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ok_exit_passes_through() {
        let result = run_check("exit 0", Duration::from_secs(5)).await;
        assert_eq!(result.result.exit_code, 0);
        assert!(result.is_executed);
    }

    #[tokio::test]
    async fn out_of_bounds_exit_is_coerced_to_unknown() {
        let result = run_check("exit 42", Duration::from_secs(5)).await;
        assert_eq!(result.result.exit_code, 3);
        assert!(result.result.stdout.contains("out of bounds"));
    }

    #[tokio::test]
    async fn plugin_missing_exit_code_is_called_out() {
        let result = run_check("exit 127", Duration::from_secs(5)).await;
        assert_eq!(result.result.exit_code, 3);
        assert!(result.result.stdout.contains("plugin may be missing"));
    }

    #[tokio::test]
    async fn timeout_is_coerced_to_critical_marker() {
        let result = run_check("sleep 5", Duration::from_millis(50)).await;
        assert_eq!(result.result.exit_code, 2);
        assert!(result.result.early_timeout);
        assert!(result.result.stdout.contains("Process Timeout"));
    }

    #[test]
    fn service_cap_rejects_once_full() {
        let mut tracker = InFlightTracker::default();
        assert!(tracker.try_start_service_check(1));
        assert!(!tracker.try_start_service_check(1));
        tracker.finish_service_check();
        assert!(tracker.try_start_service_check(1));
    }
}
