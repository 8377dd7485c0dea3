//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors. `unwrap()` and `expect()`
//! are only allowed in test modules.

use architectural_enforcement::{production_lines_of, rust_sources, workspace_root, PRODUCTION_DIRS};

#[test]
fn test_no_unwrap_in_production_code() {
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_sources(&root.join(dir)) {
            for line in production_lines_of(&path) {
                if line.code.contains(".unwrap()") || line.code.contains(".expect(") {
                    violations.push(format!(
                        "{}:{} - {}",
                        path.display(),
                        line.number,
                        line.code.trim()
                    ));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "unwrap/expect in production code:\n{}",
        violations.join("\n")
    );
}
