//! Package repository registrar
//!
//! Bucket adds are verified against the on-disk checkout marker and repaired
//! by remove/re-add when the clone did not materialize. This is the one
//! place provisioning fails hard: every optional package install silently
//! depends on bucket availability, and a partial bucket set produces
//! confusing, hard-to-diagnose downstream failures.

use winforge_core::types::PackageReference;

use crate::error::{EngineError, Result};
use crate::events::ProgressSink;
use crate::exec::{CommandExecutor, CommandSpec, RunOptions};
use crate::paths::WorkstationPaths;

/// Repair attempts after the initial add
const MAX_BUCKET_RETRIES: u32 = 5;

/// Registers package-manager buckets with verify-and-repair semantics
pub struct BucketRegistrar<'a> {
    executor: &'a CommandExecutor,
    paths: &'a WorkstationPaths,
    sink: &'a dyn ProgressSink,
}

impl<'a> BucketRegistrar<'a> {
    pub fn new(
        executor: &'a CommandExecutor,
        paths: &'a WorkstationPaths,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            executor,
            paths,
            sink,
        }
    }

    /// Register every configured bucket; the first unrecoverable bucket
    /// aborts with a fatal error
    pub async fn register_all(&self, buckets: &[PackageReference]) -> Result<()> {
        for bucket in buckets {
            self.add_bucket(bucket).await?;
        }

        if !buckets.is_empty() {
            self.sink.success("Added package repositories");
        }

        Ok(())
    }

    /// Add one bucket and verify its checkout landed on disk
    pub async fn add_bucket(&self, bucket: &PackageReference) -> Result<()> {
        // The id may carry a clone URL after the name; the on-disk checkout
        // is named by the first token only.
        let name = bucket
            .id
            .split_whitespace()
            .next()
            .unwrap_or(bucket.id.as_str())
            .to_string();

        let add_command = format!("scoop bucket add {}", bucket.id);
        let bucket_dir = self.paths.buckets_dir().join(&name);
        let marker = bucket_dir.join("bucket");

        tracing::info!(bucket = %name, "registering bucket");

        self.executor
            .run(&CommandSpec::shell(&add_command), RunOptions::tolerant())
            .await?;

        let mut retries = 0;

        while !marker.is_dir() {
            if retries >= MAX_BUCKET_RETRIES {
                self.sink.error(&format!(
                    "Could not add bucket {} despite repeated attempts",
                    name
                ));
                return Err(EngineError::BucketUnavailable {
                    name,
                    attempts: retries,
                });
            }

            tracing::warn!(
                bucket = %name,
                retry = retries + 1,
                "bucket checkout did not materialize, repairing"
            );

            if bucket_dir.is_dir() {
                self.executor
                    .run(
                        &CommandSpec::shell(format!("scoop bucket rm {}", name)),
                        RunOptions::tolerant(),
                    )
                    .await?;
            }

            self.executor
                .run(&CommandSpec::shell(&add_command), RunOptions::tolerant())
                .await?;

            retries += 1;
        }

        tracing::info!(bucket = %name, "bucket registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errlog::ErrorLog;
    use crate::events::NullSink;
    use crate::process::RecordingRunner;
    use std::sync::Arc;
    use winforge_core::retry::{RetryPolicy, RetryStrategy};

    fn executor(runner: Arc<RecordingRunner>, temp: &tempfile::TempDir) -> CommandExecutor {
        CommandExecutor::new(runner, ErrorLog::new(temp.path().join("error.log"))).with_policy(
            RetryPolicy {
                strategy: RetryStrategy::None,
                ..RetryPolicy::default()
            },
        )
    }

    #[tokio::test]
    async fn test_add_succeeds_when_marker_appears() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());
        let runner = Arc::new(RecordingRunner::new());

        // Simulate the package manager cloning the bucket on first add.
        let marker = paths.buckets_dir().join("extras").join("bucket");
        std::fs::create_dir_all(&marker).unwrap();

        let executor = executor(runner.clone(), &temp);
        let registrar = BucketRegistrar::new(&executor, &paths, &NullSink);

        registrar
            .add_bucket(&PackageReference::new("extras"))
            .await
            .unwrap();

        assert_eq!(runner.count_matching("scoop bucket add extras"), 1);
        assert_eq!(runner.count_matching("scoop bucket rm"), 0);
    }

    #[tokio::test]
    async fn test_marker_never_appears_is_fatal_after_cap() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());
        let runner = Arc::new(RecordingRunner::new());

        let executor = executor(runner.clone(), &temp);
        let registrar = BucketRegistrar::new(&executor, &paths, &NullSink);

        let result = registrar
            .add_bucket(&PackageReference::new("broken"))
            .await;

        match result {
            Err(EngineError::BucketUnavailable { name, attempts }) => {
                assert_eq!(name, "broken");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected BucketUnavailable, got {:?}", other.is_ok()),
        }

        // Initial add plus exactly five repair re-issues; no sixth retry.
        assert_eq!(runner.count_matching("scoop bucket add broken"), 6);
    }

    #[tokio::test]
    async fn test_partial_checkout_is_removed_before_repair() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());
        let runner = Arc::new(RecordingRunner::new());

        // A bucket directory without the inner checkout marker is a partial
        // clone and must be removed before the re-add.
        let bucket_dir = paths.buckets_dir().join("partial");
        std::fs::create_dir_all(&bucket_dir).unwrap();

        let marker = bucket_dir.join("bucket");
        let marker_for_rule = marker.clone();
        runner.respond_matching("scoop bucket add partial", move |_, hits| {
            // The second add (first repair) succeeds for real.
            if hits >= 1 {
                std::fs::create_dir_all(&marker_for_rule).unwrap();
            }
            crate::process::RunOutput::success("")
        });

        let executor = executor(runner.clone(), &temp);
        let registrar = BucketRegistrar::new(&executor, &paths, &NullSink);

        registrar
            .add_bucket(&PackageReference::new(
                "partial https://example.com/partial-bucket",
            ))
            .await
            .unwrap();

        assert_eq!(runner.count_matching("scoop bucket rm partial"), 1);
        assert_eq!(runner.count_matching("scoop bucket add partial"), 2);
        assert!(marker.is_dir());
    }

    #[tokio::test]
    async fn test_bucket_name_strips_clone_url() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkstationPaths::rooted_at(temp.path());
        let runner = Arc::new(RecordingRunner::new());

        let marker = paths.buckets_dir().join("custom").join("bucket");
        std::fs::create_dir_all(&marker).unwrap();

        let executor = executor(runner.clone(), &temp);
        let registrar = BucketRegistrar::new(&executor, &paths, &NullSink);

        registrar
            .add_bucket(&PackageReference::new(
                "custom https://example.com/custom-bucket",
            ))
            .await
            .unwrap();

        // The add carries the full source spec; verification used only the
        // first token for the on-disk name.
        assert_eq!(
            runner.count_matching("scoop bucket add custom https://example.com/custom-bucket"),
            1
        );
    }
}
