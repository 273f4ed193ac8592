//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async code in the session client must not block the runtime.
//! Synchronous helpers (config loading before the runtime starts, stdout
//! flushes in render functions) are allowed.

use architectural_enforcement::{production_sources, report, Violation};

#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, code) in file.code_lines() {
            let in_async = file.is_in_async_function(idx);

            if code.contains("reqwest::blocking") {
                violations.push(file.violation(idx, "Blocking HTTP client"));
            }
            if in_async && code.contains("std::fs::") {
                violations.push(file.violation(idx, "Blocking file I/O in async"));
            }
            if in_async && code.contains("std::net::") {
                violations.push(file.violation(idx, "Blocking network I/O in async"));
            }
            if in_async
                && (code.contains("std::io::stdin()") || code.contains("std::io::stdout()"))
            {
                violations.push(file.violation(idx, "Blocking stdin/stdout in async"));
            }
            if in_async && code.contains("std::process::Command") {
                violations.push(file.violation(idx, "Blocking process I/O in async"));
            }
        }
    }

    report(
        "Blocking I/O found in async production code:",
        &violations,
        "Use tokio::fs, tokio::net, tokio::io or move the call into a sync helper.",
    );
}

#[test]
fn test_config_file_read_stays_synchronous() {
    // The one std::fs call is config loading, which must stay out of async fns
    let reads: Vec<Violation> = production_sources()
        .iter()
        .flat_map(|file| {
            file.code_lines()
                .filter(|(_, code)| code.contains("std::fs::"))
                .map(|(idx, _)| file.violation(idx, "std::fs"))
                .collect::<Vec<_>>()
        })
        .collect();

    assert!(
        reads
            .iter()
            .all(|v| v.path.ends_with("client/core/src/config/mod.rs")),
        "unexpected std::fs use: {reads:?}"
    );
}
