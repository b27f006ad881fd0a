mod classname;
mod db;
mod ipc;
mod jobs;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy)]
enum Job {
    Seed,
    Reconcile,
}

fn main() {
    // Responses own stdout; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("seed") => std::process::exit(run_job(Job::Seed)),
        Some("reconcile") => std::process::exit(run_job(Job::Reconcile)),
        Some(other) => {
            eprintln!("unknown command: {other} (expected: seed | reconcile, or no command for the IPC loop)");
            std::process::exit(2);
        }
        None => run_ipc_loop(),
    }
}

/// The batch entry point. The workspace comes from SCHOOLD_WORKSPACE
/// (default: current directory); record-level anomalies are counted
/// inside the job, so any error reaching here is infrastructure-level
/// and the process exits non-zero.
fn run_job(job: Job) -> i32 {
    let workspace = std::env::var("SCHOOLD_WORKSPACE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));

    let outcome = (|| -> anyhow::Result<()> {
        let conn = db::open_db(&workspace)?;
        match job {
            Job::Seed => {
                jobs::seed_reference_data(&conn)?;
            }
            Job::Reconcile => {
                jobs::reconcile_class_grades(&conn)?;
            }
        }
        Ok(())
    })();

    match outcome {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(workspace = %workspace.display(), error = ?e, "job failed");
            1
        }
    }
}

fn run_ipc_loop() {
    let mut state = ipc::AppState::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply with an id we never parsed; send a bare error.
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
