//! Pipes of a running helper

use std::io::Write;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout};

use parking_lot::Mutex;

/// The piped standard streams of one supervised process.
///
/// A stream is `None` when it was not piped, was taken by a caller, or was
/// closed. The supervisor closes every remaining stream once the process
/// has exited.
#[derive(Debug, Default)]
pub struct StdioBundle {
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<ChildStdout>>,
    stderr: Mutex<Option<ChildStderr>>,
}

impl StdioBundle {
    /// Take ownership of the pipes the child was spawned with
    pub(crate) fn from_child(child: &mut Child) -> Self {
        Self {
            stdin: Mutex::new(child.stdin.take()),
            stdout: Mutex::new(child.stdout.take()),
            stderr: Mutex::new(child.stderr.take()),
        }
    }

    pub fn has_stdin(&self) -> bool {
        self.stdin.lock().is_some()
    }

    pub fn has_stdout(&self) -> bool {
        self.stdout.lock().is_some()
    }

    pub fn has_stderr(&self) -> bool {
        self.stderr.lock().is_some()
    }

    pub fn take_stdin(&self) -> Option<ChildStdin> {
        self.stdin.lock().take()
    }

    pub fn take_stdout(&self) -> Option<ChildStdout> {
        self.stdout.lock().take()
    }

    pub fn take_stderr(&self) -> Option<ChildStderr> {
        self.stderr.lock().take()
    }

    /// Write to stdin without taking it
    pub fn write_stdin(&self, data: &[u8]) -> std::io::Result<()> {
        let mut stdin = self.stdin.lock();
        match stdin.as_mut() {
            Some(pipe) => {
                pipe.write_all(data)?;
                pipe.flush()
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin is not available",
            )),
        }
    }

    /// Close stdin, delivering EOF to the helper
    pub fn close_stdin(&self) {
        self.stdin.lock().take();
    }

    pub(crate) fn close_all(&self) {
        self.stdin.lock().take();
        self.stdout.lock().take();
        self.stderr.lock().take();
    }
}
