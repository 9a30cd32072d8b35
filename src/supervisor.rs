//! Supervision of the local development server.
//!
//! The server runs as a child process on its own thread. A restart kills the
//! running instance before spawning a fresh one; a crash is logged and the
//! process stays down until the next restart request.

use std::process::{Child, Command};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{Context, Profile};

const POLL: Duration = Duration::from_millis(200);

enum Signal {
    Restart,
    Shutdown,
}

/// Handle to the supervising thread. Dropping it stops the server.
pub struct Supervisor {
    tx: Sender<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Starts `program script` in the project root with `NODE_ENV` set for
    /// `profile`.
    pub fn start(ctx: &Context, profile: Profile) -> Self {
        let server = &ctx.config.server;

        let mut command = Command::new(&server.program);
        command
            .arg(ctx.path(&server.script))
            .current_dir(&ctx.root)
            .env("NODE_ENV", profile.node_env());

        let (tx, rx) = channel();
        let thread = thread::spawn(move || supervise(command, rx));

        Self {
            tx,
            thread: Some(thread),
        }
    }

    pub fn restart(&self) {
        if self.tx.send(Signal::Restart).is_err() {
            tracing::error!("dev server supervisor is gone");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.tx.send(Signal::Shutdown).ok();
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

fn spawn(command: &mut Command) -> Option<Child> {
    match command.spawn() {
        Ok(child) => {
            tracing::info!("started dev server (pid {})", child.id());
            Some(child)
        }
        Err(e) => {
            tracing::error!(
                "couldn't start dev server '{}': {e}",
                command.get_program().to_string_lossy()
            );
            None
        }
    }
}

fn stop(child: &mut Option<Child>) {
    if let Some(mut child) = child.take() {
        if let Err(e) = child.kill() {
            tracing::debug!("couldn't kill dev server: {e}");
        }
        child.wait().ok();
    }
}

fn supervise(mut command: Command, rx: Receiver<Signal>) {
    let mut child = spawn(&mut command);

    loop {
        match rx.recv_timeout(POLL) {
            Ok(Signal::Restart) => {
                stop(&mut child);
                child = spawn(&mut command);
                if child.is_some() {
                    tracing::info!("restarted dev server");
                }
            }
            Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                stop(&mut child);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                let exited = match child.as_mut().map(Child::try_wait) {
                    Some(Ok(Some(status))) => Some(status),
                    Some(Err(e)) => {
                        tracing::error!("couldn't poll dev server: {e}");
                        None
                    }
                    _ => None,
                };

                if let Some(status) = exited {
                    if status.success() {
                        tracing::info!("dev server exited");
                    } else {
                        tracing::error!("dev server crashed ({status}), waiting for changes");
                    }
                    child = None;
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::time::Instant;

    use camino::Utf8Path;

    use super::*;
    use crate::config::Config;

    fn wait_for_lines(path: &Utf8Path, count: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            let lines = fs::read_to_string(path)
                .map(|text| text.lines().count())
                .unwrap_or(0);
            if lines >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        false
    }

    fn context(root: &Utf8Path, program: &str) -> Context {
        let mut config = Config::default();
        config.server.program = program.into();
        config.server.script = "server.sh".into();
        Context::new(root, config)
    }

    #[test]
    fn test_restart_spawns_again() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(
            root.join("server.sh"),
            "echo \"$NODE_ENV\" >> started.txt\nexec sleep 30\n",
        )
        .unwrap();

        let supervisor = Supervisor::start(&context(root, "sh"), Profile::Dev);
        let started = root.join("started.txt");
        assert!(wait_for_lines(&started, 1));

        supervisor.restart();
        assert!(wait_for_lines(&started, 2));
        drop(supervisor);

        let text = fs::read_to_string(&started).unwrap();
        assert!(text.lines().all(|line| line == "development"));
    }

    #[test]
    fn test_missing_program_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let supervisor = Supervisor::start(&context(root, "kumitate-no-such-program"), Profile::Prod);
        supervisor.restart();
        drop(supervisor);
    }
}
