//! Process singleton guard (C6), porting `running_process_check` from
//! `acs_messenger.py`: enumerate host processes, find peers running the
//! same binary, reconstruct each one's worker identity from its argv, and
//! refuse to start if one matches ours.
//!
//! Best-effort and advisory — a missed sibling here is still caught by the
//! claim protocol's per-row CAS, which is the actual correctness boundary.

use mail_db::identity::{Mode, WorkerIdentity};
use sysinfo::System;

#[derive(Debug, thiserror::Error)]
#[error("another mail worker process is already running with identity {0}")]
pub struct SingletonConflict(pub String);

/// Refuse to proceed if a sibling process (same binary name, different PID)
/// was launched with flags that resolve to the same [`WorkerIdentity`].
pub fn assert_unique(identity: &WorkerIdentity) -> Result<(), SingletonConflict> {
    let my_pid = std::process::id();
    let my_exe_name = current_exe_name();

    let mut system = System::new();
    system.refresh_processes();
    let hostname = system
        .host_name()
        .unwrap_or_else(|| "unknown-host".to_string());

    for (pid, process) in system.processes() {
        if pid.as_u32() == my_pid {
            continue;
        }
        let Some(exe_name) = process.exe().and_then(|p| p.file_name()).and_then(|n| n.to_str()) else {
            continue;
        };
        if exe_name != my_exe_name {
            continue;
        }

        let cmd = process.cmd();
        if let Some(other_identity) = identity_from_argv(cmd, &hostname) {
            if &other_identity == identity {
                return Err(SingletonConflict(identity.as_str().to_string()));
            }
        }
    }

    Ok(())
}

fn current_exe_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

/// Parse `-m/--mode` and `-j/--job-id` out of a process's argv, the way
/// `running_process_check` walks `cmdline` looking for those two flags
/// (long `--flag=value` and short `-f value` forms), then reconstruct the
/// identity string the same way `parse_args` does.
fn identity_from_argv(argv: &[String], hostname: &str) -> Option<WorkerIdentity> {
    let mut mode: Option<Mode> = None;
    let mut job_id: Option<String> = None;

    let mut i = 0;
    while i < argv.len() {
        let arg = argv[i].as_str();
        if let Some(value) = arg.strip_prefix("--mode=") {
            mode = Mode::parse(value).ok();
        } else if arg == "-m" || arg == "--mode" {
            if let Some(value) = argv.get(i + 1) {
                mode = Mode::parse(value).ok();
            }
        } else if let Some(value) = arg.strip_prefix("--job-id=") {
            job_id = Some(value.to_string());
        } else if arg == "-j" || arg == "--job-id" {
            if let Some(value) = argv.get(i + 1) {
                job_id = Some(value.clone());
            }
        }
        i += 1;
    }

    Some(WorkerIdentity::new(hostname, mode, job_id.as_deref()))
}
