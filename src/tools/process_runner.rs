use anyhow::{Context, Result, bail};
use log::warn;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 執行外部指令並限制最長執行時間
///
/// 逾時會終止子程序並回傳錯誤。stdout / stderr 由背景執行緒讀取，
/// 避免管線緩衝區塞滿造成子程序卡住。
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<Output> {
    let program = command.get_program().to_string_lossy().to_string();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("無法執行 {program}"))?;

    let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
    let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("無法檢查程序狀態: {program}"))?
        {
            break status;
        }

        if started.elapsed() >= timeout {
            if let Err(e) = child.kill() {
                warn!("無法終止逾時程序 {program}: {e}");
            }
            let _ = child.wait();
            bail!("{program} 執行逾時（{:.1}s）", timeout.as_secs_f64());
        }

        thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: join_pipe_reader(stdout_reader),
        stderr: join_pipe_reader(stderr_reader),
    })
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn join_pipe_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_fast_command_returns_output() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo hello"]);
        let output = run_with_timeout(command, Duration::from_secs(5)).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn test_slow_command_is_killed() {
        let mut command = Command::new("sh");
        command.args(["-c", "sleep 5"]);
        let started = Instant::now();
        let err = run_with_timeout(command, Duration::from_millis(100)).unwrap_err();
        assert!(err.to_string().contains("逾時"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let command = Command::new("definitely-not-a-real-program-xyz");
        assert!(run_with_timeout(command, Duration::from_secs(1)).is_err());
    }
}
