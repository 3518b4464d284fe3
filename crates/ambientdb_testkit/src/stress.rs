//! Stress helpers for concurrent transaction scopes.
//!
//! These drive many scopes from many threads through one shared facade and
//! registry.

use crate::fixtures::TestClient;
use ambientdb_core::{ScopeOption, TransactionScope, TxError};
use ambientdb_driver::{doc, Filter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total scopes run.
    pub total_ops: usize,
    /// Scopes that committed.
    pub successful_ops: usize,
    /// Scopes that failed.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Scopes per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Scopes: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} scopes/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Scopes run by each thread, one after another.
    pub scopes_per_thread: usize,
    /// Operations issued inside each scope.
    pub ops_per_scope: usize,
    /// Target database.
    pub database: String,
    /// Target collection.
    pub collection: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 10,
            scopes_per_thread: 20,
            ops_per_scope: 3,
            database: "stress".into(),
            collection: "docs".into(),
        }
    }
}

/// Runs scopes concurrently, each inserting documents tagged with its thread.
///
/// Every scope checks, inside its transaction, that it sees exactly its
/// thread's committed documents plus its own uncommitted ones. A scope whose
/// check fails is rolled back and counted as failed.
pub fn stress_concurrent_scopes(client: &TestClient, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let coll = client.collection(&config.database, &config.collection);

    let start = Instant::now();

    thread::scope(|s| {
        for t in 0..config.threads {
            let coll = coll.clone();
            let successful = &successful;
            let failed = &failed;
            s.spawn(move || {
                let tag = t as i64;
                for i in 0..config.scopes_per_thread {
                    let result = TransactionScope::run(&client.root, ScopeOption::Required, |cx| {
                        for op in 0..config.ops_per_scope {
                            let id = format!("{t}-{i}-{op}");
                            coll.insert_one(cx, doc! { "_id": id, "thread": tag })?;
                        }
                        let seen = coll.count_documents(cx, Filter::eq("thread", tag))?;
                        let expected = ((i + 1) * config.ops_per_scope) as u64;
                        if seen != expected {
                            let id = cx.current_transaction_id().unwrap_or_default();
                            return Err(TxError::aborted(
                                id,
                                format!("saw {seen} documents, expected {expected}"),
                            ));
                        }
                        Ok(())
                    });
                    match result {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_run_commits_everything() {
        let client = TestClient::new();
        let config = StressConfig {
            threads: 3,
            scopes_per_thread: 4,
            ops_per_scope: 2,
            ..StressConfig::default()
        };
        let result = stress_concurrent_scopes(&client, &config);
        assert_eq!(result.total_ops, 12);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(client.committed_count("stress", "docs"), 24);
        client.assert_no_leaks();
    }
}
