//! Process runner seam
//!
//! External tools are opaque collaborators observed only through exit codes
//! and captured output, so the engine talks to them through a narrow trait.
//! `SystemRunner` spawns real processes; `RecordingRunner` answers from
//! scripted rules for tests and dry runs.

use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// A single external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Text piped to the child's stdin, for tools driven interactively
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
        }
    }

    /// The literal command text, for audit logging
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a completed invocation
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    /// A zero-exit result with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A non-zero-exit result with the given stderr
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Both streams joined, stdout first
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (false, true) => self.stdout.clone(),
            (true, _) => self.stderr.clone(),
        }
    }
}

/// Runs external commands
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<RunOutput>;
}

/// Spawns real processes through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<RunOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if invocation.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = command.spawn()?;

        if let (Some(mut handle), Some(input)) = (child.stdin.take(), invocation.stdin.as_ref()) {
            handle.write_all(input.as_bytes()).await?;
            drop(handle);
        }

        let output = child.wait_with_output().await?;

        Ok(RunOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

type ResponseFn = dyn Fn(&Invocation, u32) -> RunOutput + Send + Sync;

/// A runner that records invocations and answers from scripted rules
///
/// Used by tests and by `provision --dry-run`. Rules match on a substring of
/// the command text; the first matching rule answers, everything else
/// succeeds with empty output. The responder also receives how many times
/// its rule matched before, so behavior can change across attempts.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<Invocation>>,
    rules: Mutex<Vec<Rule>>,
}

struct Rule {
    pattern: String,
    hits: AtomicU32,
    respond: Box<ResponseFn>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` with the given responder
    pub fn respond_matching<F>(&self, pattern: impl Into<String>, respond: F)
    where
        F: Fn(&Invocation, u32) -> RunOutput + Send + Sync + 'static,
    {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.into(),
            hits: AtomicU32::new(0),
            respond: Box::new(respond),
        });
    }

    /// Fail every command containing `pattern` with the given exit code
    pub fn fail_matching(&self, pattern: impl Into<String>, exit_code: i32) {
        self.respond_matching(pattern, move |_, _| {
            RunOutput::failure(exit_code, "simulated failure")
        });
    }

    /// Fail the first `times` commands containing `pattern`, then succeed
    pub fn fail_times(&self, pattern: impl Into<String>, times: u32, exit_code: i32) {
        self.respond_matching(pattern, move |_, previous_hits| {
            if previous_hits < times {
                RunOutput::failure(exit_code, "simulated failure")
            } else {
                RunOutput::success("")
            }
        });
    }

    /// All invocations recorded so far
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Command texts of all invocations recorded so far
    pub fn commands(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(Invocation::display)
            .collect()
    }

    /// Number of recorded commands containing `pattern`
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.commands()
            .iter()
            .filter(|command| command.contains(pattern))
            .count()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<RunOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());

        let command = invocation.display();
        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if command.contains(&rule.pattern) {
                let previous_hits = rule.hits.fetch_add(1, Ordering::SeqCst);
                return Ok((rule.respond)(invocation, previous_hits));
            }
        }

        Ok(RunOutput::success(""))
    }
}
