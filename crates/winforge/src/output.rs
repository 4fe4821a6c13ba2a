//! Console progress sink
//!
//! Renders engine events to the terminal and owns the single pre-run
//! confirmation prompt.

use owo_colors::OwoColorize;
use winforge_engine::ProgressSink;

/// Sink printing colored progress lines to stdout
pub struct ConsoleSink {
    assume_yes: bool,
}

impl ConsoleSink {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl ProgressSink for ConsoleSink {
    fn success(&self, message: &str) {
        println!("{} {}", "+".green().bold(), message);
    }

    fn info(&self, message: &str) {
        println!("{} {}", "*".blue(), message);
    }

    fn warning(&self, message: &str) {
        println!("{} {}", "!".yellow().bold(), message);
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", "x".red().bold(), message);
    }

    fn step_completed(&self, step: &str) {
        println!("{}", format!("── {} done", step).dimmed());
    }

    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .unwrap_or(false)
    }
}
