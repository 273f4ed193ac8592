//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code waits on I/O, channels or deadlines, never on
//! a bare sleep. The only timer is the supervisor's reconnect deadline.
//!
//! `std::thread::sleep` is forbidden everywhere; it parks a runtime worker.

use architectural_enforcement::{production_sources, report};

/// Files allowed to arm tokio timers
const TIMER_ALLOWLIST: &[&str] = &["client/core/src/transport/supervisor.rs"];

#[test]
fn test_no_thread_sleep() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, code) in file.code_lines() {
            if code.contains("thread::sleep") {
                violations.push(file.violation(idx, "Thread sleep"));
            }
        }
    }

    report(
        "std::thread::sleep found in production code:",
        &violations,
        "Await the event instead (channel recv, watch::changed, socket read).",
    );
}

#[test]
fn test_timers_only_in_supervisor() {
    let mut violations = Vec::new();

    for file in production_sources() {
        let allowed = TIMER_ALLOWLIST
            .iter()
            .any(|allowed| file.path.ends_with(allowed));
        if allowed {
            continue;
        }
        for (idx, code) in file.code_lines() {
            if code.contains("time::sleep") || code.contains("sleep_until") {
                violations.push(file.violation(idx, "Sleep outside reconnect timer"));
            }
        }
    }

    report(
        "Timer sleeps found outside the connection supervisor:",
        &violations,
        "Reconnect scheduling lives in the supervisor; everything else is event-driven.",
    );
}
