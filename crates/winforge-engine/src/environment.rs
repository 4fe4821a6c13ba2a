//! Environment reconciliation
//!
//! After a step mutates persistent machine state (installing the package
//! manager, most importantly), the registry-backed environment variables are
//! re-read into the running process so later steps observe the updated PATH
//! and tool locations without an OS restart. Reconciliation is best-effort:
//! it logs and swallows every failure.

use std::path::PathBuf;
use std::sync::Arc;

use winforge_core::types::RegistryHive;

use crate::error::Result;
use crate::exec::{CommandExecutor, CommandSpec, EnvironmentRefresher, RunOptions};
use crate::registry::{RegistryStore, RegistryValue};

/// User-scope environment key below HKEY_CURRENT_USER
pub const USER_ENVIRONMENT_KEY: &str = "Environment";

/// Machine-scope environment key below HKEY_LOCAL_MACHINE
pub const MACHINE_ENVIRONMENT_KEY: &str =
    r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

/// Variables holding semicolon-separated lists that merge rather than replace
const LIST_VARIABLES: &[&str] = &["PATH", "PATHEXT", "PSMODULEPATH"];

/// Variables collapsed to their first segment; downstream tools cannot
/// handle multi-valued temp directories
const TEMP_VARIABLES: &[&str] = &["TMP", "TEMP"];

/// Merges persisted environment variables into the running process
pub struct EnvironmentReconciler {
    store: Arc<dyn RegistryStore>,
}

impl EnvironmentReconciler {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Reconcile now; never fails
    pub fn reconcile(&self) {
        match self.try_reconcile() {
            Ok(count) => tracing::debug!(variables = count, "environment reconciled"),
            Err(err) => tracing::warn!(error = %err, "environment reconciliation failed"),
        }
    }

    fn try_reconcile(&self) -> Result<usize> {
        let persisted: Vec<(String, String)> = self
            .store
            .list_values(RegistryHive::CurrentUser, USER_ENVIRONMENT_KEY)?
            .into_iter()
            .filter_map(|(name, value)| {
                value.as_string().map(|text| (name, text.to_string()))
            })
            .collect();

        let mut merged = Vec::with_capacity(persisted.len());

        for (name, value) in &persisted {
            let resolved = resolve_indirection(value, &persisted);

            let final_value = if is_list_variable(name) {
                let in_process = std::env::var(name).unwrap_or_default();
                merge_list_variable(&in_process, &resolved)
            } else if is_temp_variable(name) {
                resolved.split(';').next().unwrap_or_default().to_string()
            } else {
                resolved
            };

            std::env::set_var(name, &final_value);
            merged.push((name.clone(), RegistryValue::String(final_value)));
        }

        // One batched write; per-variable writes would churn the registry
        // for no benefit.
        self.store
            .set_values(RegistryHive::LocalMachine, MACHINE_ENVIRONMENT_KEY, &merged)?;

        Ok(merged.len())
    }
}

impl EnvironmentRefresher for EnvironmentReconciler {
    fn refresh(&self) {
        self.reconcile();
    }
}

fn is_list_variable(name: &str) -> bool {
    LIST_VARIABLES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

fn is_temp_variable(name: &str) -> bool {
    TEMP_VARIABLES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Resolve one level of `%VAR%` indirection against already-read variables,
/// falling back to the process environment
fn resolve_indirection(value: &str, variables: &[(String, String)]) -> String {
    let mut output = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                let referenced = variables
                    .iter()
                    .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
                    .map(|(_, resolved)| resolved.clone())
                    .or_else(|| std::env::var(name).ok());

                match referenced {
                    Some(resolved) if !name.is_empty() => output.push_str(&resolved),
                    _ => {
                        output.push('%');
                        output.push_str(name);
                        output.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                output.push('%');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

/// Concatenate two semicolon-separated lists, deduplicated by exact segment
/// match, preserving first-seen order
pub fn merge_list_variable(existing: &str, incoming: &str) -> String {
    let mut seen: Vec<&str> = Vec::new();

    for segment in existing.split(';').chain(incoming.split(';')) {
        if segment.is_empty() || seen.contains(&segment) {
            continue;
        }
        seen.push(segment);
    }

    seen.join(";")
}

/// Append toolchain directories to the in-process PATH and persist the
/// addition to the user scope. Returns whether anything new was added.
pub async fn extend_path(executor: &CommandExecutor, directories: &[PathBuf]) -> Result<bool> {
    let current = std::env::var("PATH").unwrap_or_default();
    let mut path = current.clone();
    let mut added = false;

    for directory in directories {
        let segment = directory.display().to_string();
        if current.split(';').any(|existing| existing == segment) {
            continue;
        }
        if !path.is_empty() {
            path.push(';');
        }
        path.push_str(&segment);
        added = true;
    }

    if !added {
        return Ok(false);
    }

    std::env::set_var("PATH", &path);
    tracing::info!(path = %path, "extended PATH with toolchain directories");

    executor
        .run(
            &CommandSpec::script(format!(
                "[Environment]::SetEnvironmentVariable(\"PATH\", \"{}\", \"User\")",
                path
            )),
            RunOptions::tolerant(),
        )
        .await?;

    Ok(true)
}
