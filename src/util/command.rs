use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}: {1}")]
    Spawn(String, io::Error),
    #[error("{0}: {1}")]
    Io(String, io::Error),
    #[error("{0}")]
    TimedOut(String),
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub fn describe(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect();
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

pub fn run_with_timeout(
    cmd: &mut Command,
    input: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let program = cmd.get_program().to_string_lossy().to_string();
    debug!(command = %describe(cmd), "run");
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| CommandError::Spawn(program.clone(), e))?;
    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(input.as_bytes()) {
                if err.kind() != io::ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::Io(program, err));
                }
            }
        }
    }
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(err) => return Err(CommandError::Io(program, err)),
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandError::TimedOut(program));
        }
        thread::sleep(POLL_INTERVAL);
    };

    // daemonizing helpers may hand the pipes to a background process
    Ok(CommandOutput {
        code: status.code().unwrap_or(1),
        stdout: stdout.map(collect_output).unwrap_or_default(),
        stderr: stderr.map(collect_output).unwrap_or_default(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect_output(rx: Receiver<String>) -> String {
    rx.recv_timeout(OUTPUT_GRACE).unwrap_or_default()
}
