//! Host preflight checks
//!
//! Provisioning rewrites machine state and disables protections; it must
//! run elevated, and Defender's real-time protection has to be off before
//! analysis tooling lands on disk. Both states are observed through
//! PowerShell output, the same way every other host fact is gathered.

use anyhow::{bail, Result};
use winforge_engine::{CommandExecutor, CommandSpec, ProgressSink, RunOptions};

/// Verify the host is ready for provisioning
///
/// No-op off Windows so dry runs work anywhere.
pub async fn check_host(executor: &CommandExecutor, sink: &dyn ProgressSink) -> Result<()> {
    if !cfg!(windows) {
        tracing::debug!("non-Windows host, skipping preflight checks");
        return Ok(());
    }

    let elevation = executor
        .run(
            &CommandSpec::script(
                "[Security.Principal.WindowsPrincipal]::new(\
                 [Security.Principal.WindowsIdentity]::GetCurrent())\
                 .IsInRole([Security.Principal.WindowsBuiltInRole]::Administrator)",
            ),
            RunOptions::tolerant().with_attempts(1),
        )
        .await?;

    if elevation.succeeded && elevation.output.trim().eq_ignore_ascii_case("false") {
        sink.error("Provisioning must run from an elevated shell");
        bail!("not running with administrative privileges");
    }

    let realtime = executor
        .run(
            &CommandSpec::script(
                "Get-MpPreference | Select-Object -ExpandProperty DisableRealtimeMonitoring",
            ),
            RunOptions::tolerant().with_attempts(1),
        )
        .await?;

    // DisableRealtimeMonitoring reports False while protection is active.
    if realtime.succeeded && realtime.output.trim().eq_ignore_ascii_case("false") {
        sink.error(
            "Windows Defender real-time protection is enabled; disable it before provisioning",
        );
        bail!("real-time protection is enabled");
    }

    Ok(())
}
