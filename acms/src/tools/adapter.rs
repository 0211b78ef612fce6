use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::{ToolRunRequest, ToolRunResult, EXIT_BINARY_NOT_FOUND, EXIT_RUNTIME_ERROR, EXIT_TIMEOUT};

/// Spawn `request`'s tool as a child process and collect a `ToolRunResult`.
///
/// This function never returns an `Err` and never panics on a child-process
/// failure: every OS-level failure mode is classified into a reserved
/// negative exit code with a descriptive stderr, per the tool adapter's
/// "never raises" contract.
pub async fn run_tool(request: &ToolRunRequest) -> ToolRunResult {
    let started_at = now_ms();
    let start = Instant::now();

    let mut command = Command::new(&request.tool_id);
    command.args(&request.args).current_dir(&request.cwd).envs(&request.env);
    command.kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(tool_id = %request.tool_id, "tool binary not found");
            return synthetic_result(request, EXIT_BINARY_NOT_FOUND, format!("binary not found: {}", request.tool_id), started_at, start);
        }
        Err(e) => {
            warn!(tool_id = %request.tool_id, error = %e, "failed to spawn tool process");
            return synthetic_result(request, EXIT_RUNTIME_ERROR, format!("spawn failed: {e}"), started_at, start);
        }
    };

    let deadline = Duration::from_secs(request.timeout_seconds.max(1));
    match timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            debug!(tool_id = %request.tool_id, exit_code = output.status.code(), "tool run completed");
            ToolRunResult {
                tool_id: request.tool_id.clone(),
                exit_code: output.status.code().unwrap_or(EXIT_RUNTIME_ERROR),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: false,
                started_at,
                ended_at: now_ms(),
            }
        }
        Ok(Err(e)) => {
            warn!(tool_id = %request.tool_id, error = %e, "tool process IO error");
            synthetic_result(request, EXIT_RUNTIME_ERROR, format!("io error waiting on child: {e}"), started_at, start)
        }
        Err(_) => {
            warn!(tool_id = %request.tool_id, timeout_seconds = request.timeout_seconds, "tool run timed out");
            ToolRunResult {
                tool_id: request.tool_id.clone(),
                exit_code: EXIT_TIMEOUT,
                stdout: String::new(),
                stderr: format!("timed out after {}s", request.timeout_seconds),
                duration_ms: start.elapsed().as_millis() as u64,
                timed_out: true,
                started_at,
                ended_at: now_ms(),
            }
        }
    }
}

fn synthetic_result(request: &ToolRunRequest, exit_code: i32, stderr: String, started_at: i64, start: Instant) -> ToolRunResult {
    ToolRunResult {
        tool_id: request.tool_id.clone(),
        exit_code,
        stdout: String::new(),
        stderr,
        duration_ms: start.elapsed().as_millis() as u64,
        timed_out: false,
        started_at,
        ended_at: now_ms(),
    }
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_yields_reserved_exit_code() {
        let req = ToolRunRequest::new("definitely-not-a-real-binary-xyz", vec![], ".", 5);
        let result = run_tool(&req).await;
        assert_eq!(result.exit_code, EXIT_BINARY_NOT_FOUND);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn successful_run_captures_stdout() {
        let req = ToolRunRequest::new("echo", vec!["hello".to_string()], ".", 5);
        let result = run_tool(&req).await;
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
        assert!(result.succeeded());
    }

    #[tokio::test]
    async fn nonzero_exit_is_surfaced_verbatim() {
        let req = ToolRunRequest::new("sh", vec!["-c".to_string(), "exit 7".to_string()], ".", 5);
        let result = run_tool(&req).await;
        assert_eq!(result.exit_code, 7);
    }

    #[tokio::test]
    async fn timeout_is_honored_and_marks_timed_out() {
        let req = ToolRunRequest::new("sleep", vec!["30".to_string()], ".", 1);
        let result = run_tool(&req).await;
        assert!(result.timed_out);
        assert_eq!(result.exit_code, EXIT_TIMEOUT);
        assert!(result.duration_ms < 3_000);
    }
}
