//! Fixture handles and collision-free fixture naming

use profile_e2e_common::{ProfileId, FIXTURE_PREFIX};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Last millisecond stamp handed out in this process
static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Millisecond stamp that is strictly increasing within the process, so two
/// cases started in the same millisecond still get distinct names
pub fn unique_stamp() -> u64 {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// `E2E Test {operation} {timestamp}`
pub fn fixture_name(operation: &str) -> String {
    format!("{}{} {}", FIXTURE_PREFIX, operation, unique_stamp())
}

/// Test-owned profile, destroyed at the end of its case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureHandle {
    pub id: ProfileId,
    pub name: String,
    /// Operation label the name was derived from
    pub operation: String,
}

/// Result of releasing a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Deleted,
    /// Already absent, e.g. the operation under test deleted it
    AlreadyGone,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fixture_name_format() {
        let name = fixture_name("Rename");
        let stamp = name.strip_prefix("E2E Test Rename ").unwrap();
        assert!(stamp.parse::<u64>().unwrap() > 1_700_000_000_000);
    }

    #[test]
    fn test_names_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..200).map(|_| fixture_name("Load")).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(seen.insert(name), "duplicate fixture name");
            }
        }
        assert_eq!(seen.len(), 1600);
    }
}
