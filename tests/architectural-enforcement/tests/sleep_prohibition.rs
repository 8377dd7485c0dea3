//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Components wait on
//! channels, deadlines or intervals instead.
//! **Exceptions**: reconnect backoff (retry logic only), test code

use std::path::Path;

use architectural_enforcement::{production_lines_of, rust_sources, workspace_root, PRODUCTION_DIRS};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ ACCEPTABLE waiting:");
        eprintln!("  - tokio::time::sleep_until / timeout for reconnect backoff");
        eprintln!("  - tokio::time::interval for periodic tasks");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn find_sleep_violations() -> Vec<String> {
    let root = workspace_root();
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for path in rust_sources(&root.join(dir)) {
            check_file(&path, &mut violations);
        }
    }
    violations
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let lines = production_lines_of(path);
    for (idx, line) in lines.iter().enumerate() {
        if !(line.code.contains("::sleep(") || line.code.contains(".sleep(")) {
            continue;
        }
        if is_backoff_context(&lines, idx) {
            continue;
        }
        violations.push(format!(
            "{}:{} - {}",
            path.display(),
            line.number,
            line.code.trim()
        ));
    }
}

/// Sleep next to retry/backoff vocabulary is reconnect pacing
fn is_backoff_context(lines: &[architectural_enforcement::SourceLine], idx: usize) -> bool {
    let range = idx.saturating_sub(15)..std::cmp::min(idx + 5, lines.len());
    lines[range].iter().any(|line| {
        let code = line.code.to_lowercase();
        code.contains("retry") || code.contains("reconnect") || code.contains("backoff")
    })
}

#[test]
fn test_backoff_detection() {
    let lines = architectural_enforcement::production_lines(
        "fn reconnect() {\n    let delay = retry.next_delay(&options);\n    tokio::time::sleep(delay).await;\n}\n",
    );
    assert!(is_backoff_context(&lines, 2));

    let lines = architectural_enforcement::production_lines(
        "fn poll() {\n    loop {\n        tokio::time::sleep(d).await;\n    }\n}\n",
    );
    assert!(!is_backoff_context(&lines, 2));
}
