//! Command executor
//!
//! Wraps shell/PowerShell invocation with bounded retry, output
//! normalization, and structured logging. Every invocation is logged with
//! its literal command text before execution, and every failed attempt is
//! appended to the persistent error log regardless of whether the caller
//! tolerates the failure.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use winforge_core::retry::{retry_with_policy, RetryPolicy};
use winforge_core::utils::normalize_blank_lines;

use crate::errlog::ErrorLog;
use crate::error::{EngineError, Result};
use crate::process::{Invocation, ProcessRunner};

/// One external command, in exactly one of three forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// A flat command string, tokenized on whitespace
    Shell(String),
    /// A script body run through the platform script interpreter
    Script(String),
    /// A pre-tokenized argument vector (first element is the program)
    Argv(Vec<String>),
}

impl CommandSpec {
    /// Convenience constructor for the shell form
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    /// Convenience constructor for the script form
    pub fn script(body: impl Into<String>) -> Self {
        Self::Script(body.into())
    }

    /// Convenience constructor for the argument-vector form
    pub fn argv<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Argv(parts.into_iter().map(Into::into).collect())
    }

    /// The literal command text, for audit logging
    pub fn display(&self) -> String {
        match self {
            CommandSpec::Shell(command) => command.clone(),
            CommandSpec::Script(body) => format!("powershell -NoProfile -Command {}", body),
            CommandSpec::Argv(parts) => parts.join(" "),
        }
    }

    fn to_invocation(&self, stdin: Option<String>) -> Invocation {
        let mut invocation = match self {
            CommandSpec::Shell(command) => {
                let mut tokens = command.split_whitespace().map(str::to_string);
                let program = tokens.next().unwrap_or_default();
                Invocation::new(program, tokens.collect())
            }
            CommandSpec::Script(body) => Invocation::new(
                "powershell",
                vec![
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    body.clone(),
                ],
            ),
            CommandSpec::Argv(parts) => {
                let program = parts.first().cloned().unwrap_or_default();
                Invocation::new(program, parts.iter().skip(1).cloned().collect())
            }
        };
        invocation.stdin = stdin;
        invocation
    }
}

/// Per-call execution options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Return a failure result instead of an error once attempts are spent
    pub failure_okay: bool,

    /// Attempt budget, including the first attempt
    pub max_attempts: u32,

    /// Re-read registry-backed environment variables after success
    pub refresh_environment: bool,

    /// Text piped to the child's stdin on each attempt
    pub stdin: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            failure_okay: false,
            max_attempts: 3,
            refresh_environment: false,
            stdin: None,
        }
    }
}

impl RunOptions {
    /// Options that tolerate total failure
    pub fn tolerant() -> Self {
        Self {
            failure_okay: true,
            ..Self::default()
        }
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_refresh(mut self) -> Self {
        self.refresh_environment = true;
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Result of a completed (possibly tolerated-failed) command
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub succeeded: bool,
    pub exit_code: i32,
    /// Captured output with repeated blank lines collapsed
    pub output: String,
    /// Attempts actually used
    pub attempts: u32,
}

/// Re-reads persisted environment variables into the running process
///
/// Implemented by the environment reconciler; the executor only needs the
/// hook, not the registry plumbing behind it.
pub trait EnvironmentRefresher: Send + Sync {
    fn refresh(&self);
}

/// One failed attempt, fed back into the retry engine
#[derive(Debug)]
struct AttemptFailure {
    exit_code: Option<i32>,
    output: String,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "failed to start"),
        }
    }
}

/// Executes external commands with bounded retry and persistent failure logs
pub struct CommandExecutor {
    runner: Arc<dyn ProcessRunner>,
    error_log: ErrorLog,
    policy: RetryPolicy,
    refresher: Option<Arc<dyn EnvironmentRefresher>>,
}

impl CommandExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, error_log: ErrorLog) -> Self {
        Self {
            runner,
            error_log,
            policy: RetryPolicy::default(),
            refresher: None,
        }
    }

    /// Replace the delay policy template. The per-call attempt budget from
    /// `RunOptions` always overrides the template's `max_attempts`.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach the environment refresher honored by `refresh_environment`
    pub fn with_refresher(mut self, refresher: Arc<dyn EnvironmentRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// The error log this executor appends failures to
    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Execute a command under the given options
    ///
    /// Retries up to `max_attempts` times. Exhaustion either returns a
    /// failure result (`failure_okay`) or `EngineError::CommandFailed`.
    pub async fn run(&self, spec: &CommandSpec, options: RunOptions) -> Result<CompletedRun> {
        let invocation = spec.to_invocation(options.stdin.clone());
        let command_text = spec.display();
        let policy = RetryPolicy {
            max_attempts: options.max_attempts,
            ..self.policy.clone()
        };

        let attempts_used = AtomicU32::new(0);

        let outcome = retry_with_policy(&policy, |attempt| {
            attempts_used.store(attempt, Ordering::SeqCst);
            let invocation = invocation.clone();
            let command_text = command_text.clone();

            async move {
                tracing::info!(command = %command_text, attempt = attempt, "running command");

                match self.runner.run(&invocation).await {
                    Ok(output) => {
                        let normalized = normalize_blank_lines(&output.combined());

                        if output.succeeded() {
                            if !normalized.trim().is_empty() {
                                tracing::info!("{}", normalized.trim_end());
                            }
                            Ok(normalized)
                        } else {
                            self.error_log.append(
                                &command_text,
                                &format!("exit code {}\n{}", output.exit_code, normalized),
                            );
                            tracing::warn!(
                                command = %command_text,
                                exit_code = output.exit_code,
                                "command failed"
                            );
                            Err(AttemptFailure {
                                exit_code: Some(output.exit_code),
                                output: normalized,
                            })
                        }
                    }
                    Err(err) => {
                        self.error_log
                            .append(&command_text, &format!("failed to start: {}", err));
                        tracing::warn!(
                            command = %command_text,
                            error = %err,
                            "failed to start command"
                        );
                        Err(AttemptFailure {
                            exit_code: None,
                            output: err.to_string(),
                        })
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(output) => {
                let run = CompletedRun {
                    succeeded: true,
                    exit_code: 0,
                    output,
                    attempts: attempts_used.load(Ordering::SeqCst),
                };

                if options.refresh_environment {
                    if let Some(refresher) = &self.refresher {
                        refresher.refresh();
                    }
                }

                Ok(run)
            }
            Err(exhausted) => {
                let attempts = exhausted.attempts;
                let failure = exhausted.source;

                if options.failure_okay {
                    tracing::warn!(
                        command = %command_text,
                        attempts = attempts,
                        "command failed on every attempt, continuing"
                    );
                    Ok(CompletedRun {
                        succeeded: false,
                        exit_code: failure.exit_code.unwrap_or(-1),
                        output: failure.output,
                        attempts,
                    })
                } else {
                    Err(EngineError::CommandFailed {
                        command: command_text,
                        exit_code: failure.exit_code,
                        attempts,
                        output: failure.output,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{RecordingRunner, RunOutput};
    use std::sync::atomic::AtomicBool;
    use winforge_core::retry::RetryStrategy;

    fn immediate_policy() -> RetryPolicy {
        RetryPolicy {
            strategy: RetryStrategy::None,
            ..RetryPolicy::default()
        }
    }

    fn executor_with(runner: Arc<RecordingRunner>, temp: &tempfile::TempDir) -> CommandExecutor {
        let error_log = ErrorLog::new(temp.path().join("error.log"));
        CommandExecutor::new(runner, error_log).with_policy(immediate_policy())
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let executor = executor_with(runner.clone(), &temp);

        let run = executor
            .run(&CommandSpec::shell("scoop install yara"), RunOptions::default())
            .await
            .unwrap();

        assert!(run.succeeded);
        assert_eq!(run.attempts, 1);
        assert_eq!(runner.count_matching("scoop install yara"), 1);
    }

    #[tokio::test]
    async fn test_exactly_n_invocations_when_first_n_minus_one_fail() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.fail_times("flaky-tool", 2, 1);
        let executor = executor_with(runner.clone(), &temp);

        let run = executor
            .run(
                &CommandSpec::shell("scoop install flaky-tool"),
                RunOptions::default().with_attempts(3),
            )
            .await
            .unwrap();

        assert!(run.succeeded);
        assert_eq!(run.attempts, 3);
        assert_eq!(runner.count_matching("flaky-tool"), 3);
    }

    #[tokio::test]
    async fn test_failure_okay_returns_failure_result() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.fail_matching("always-broken", 2);
        let executor = executor_with(runner.clone(), &temp);

        let run = executor
            .run(
                &CommandSpec::shell("scoop install always-broken"),
                RunOptions::tolerant(),
            )
            .await
            .unwrap();

        assert!(!run.succeeded);
        assert_eq!(run.exit_code, 2);
        assert_eq!(run.attempts, 3);
        assert_eq!(runner.count_matching("always-broken"), 3);
    }

    #[tokio::test]
    async fn test_failure_raises_without_failure_okay() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.fail_matching("always-broken", 1);
        let executor = executor_with(runner.clone(), &temp);

        let result = executor
            .run(
                &CommandSpec::shell("scoop install always-broken"),
                RunOptions::default(),
            )
            .await;

        match result {
            Err(EngineError::CommandFailed {
                exit_code, attempts, ..
            }) => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(attempts, 3);
            }
            other => panic!("expected CommandFailed, got {:?}", other.map(|run| run.succeeded)),
        }
    }

    #[tokio::test]
    async fn test_failed_attempts_land_in_error_log() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.fail_matching("always-broken", 1);
        let executor = executor_with(runner.clone(), &temp);

        let _ = executor
            .run(
                &CommandSpec::shell("scoop install always-broken"),
                RunOptions::tolerant().with_attempts(2),
            )
            .await
            .unwrap();

        let content = std::fs::read_to_string(temp.path().join("error.log")).unwrap();
        assert_eq!(content.matches("scoop install always-broken").count(), 2);
        assert!(content.contains("exit code 2") || content.contains("exit code 1"));
    }

    #[tokio::test]
    async fn test_output_normalization() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond_matching("chatty", |_, _| {
            RunOutput::success("line one\n\n\n\nline two\n")
        });
        let executor = executor_with(runner.clone(), &temp);

        let run = executor
            .run(&CommandSpec::shell("chatty"), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(run.output, "line one\n\nline two\n");
    }

    #[tokio::test]
    async fn test_refresh_environment_invoked_on_success() {
        struct FlagRefresher(AtomicBool);
        impl EnvironmentRefresher for FlagRefresher {
            fn refresh(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let refresher = Arc::new(FlagRefresher(AtomicBool::new(false)));
        let error_log = ErrorLog::new(temp.path().join("error.log"));
        let executor = CommandExecutor::new(runner, error_log)
            .with_policy(immediate_policy())
            .with_refresher(refresher.clone());

        executor
            .run(
                &CommandSpec::shell("scoop install git"),
                RunOptions::default().with_refresh(),
            )
            .await
            .unwrap();

        assert!(refresher.0.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let executor = executor_with(runner.clone(), &temp);

        executor
            .run(
                &CommandSpec::argv(["idapyswitch.exe"]),
                RunOptions::tolerant().with_stdin("0"),
            )
            .await
            .unwrap();

        assert_eq!(runner.invocations()[0].stdin.as_deref(), Some("0"));
    }

    #[test]
    fn test_command_spec_display() {
        assert_eq!(
            CommandSpec::shell("scoop install git").display(),
            "scoop install git"
        );
        assert_eq!(
            CommandSpec::argv(["git", "clone", "url"]).display(),
            "git clone url"
        );
        assert!(CommandSpec::script("Restart-Computer")
            .display()
            .contains("Restart-Computer"));
    }

    #[test]
    fn test_script_spec_uses_interpreter() {
        let invocation = CommandSpec::script("Get-Date").to_invocation(None);

        assert_eq!(invocation.program, "powershell");
        assert_eq!(invocation.args.last().map(String::as_str), Some("Get-Date"));
    }
}
