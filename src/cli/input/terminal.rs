//! Line-oriented terminal access used by the interactive prompts.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Set while a secret prompt has echo turned off. This is the only state the
/// signal handler shares with the main flow.
static ECHO_SUPPRESSED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Couldn't read hidden input from the terminal")]
    HiddenInput(#[source] io::Error),
}

pub trait Terminal {
    /// Writes prompt text without a trailing newline.
    fn print(&mut self, text: &str) -> io::Result<()>;

    /// Reads one line including its line terminator. Returns `None` at end
    /// of input.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Reads one line with local echo turned off, without its line
    /// terminator. Echo is back on when this returns, whatever the outcome.
    /// Returns `None` at end of input.
    fn read_secret(&mut self) -> Result<Option<String>, TerminalError>;
}

/// The process' stdin/stdout. Secrets are read from the controlling
/// terminal.
#[derive(Default)]
pub struct StdTerminal;

impl Terminal for StdTerminal {
    fn print(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();

        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();

        match io::stdin().lock().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }

    fn read_secret(&mut self) -> Result<Option<String>, TerminalError> {
        let _suppressed = SuppressedEcho::enter(&ECHO_SUPPRESSED);

        match rpassword::read_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(TerminalError::HiddenInput(e)),
        }
    }
}

/// Marks echo as suppressed for the signal handler until dropped. rpassword
/// restores the terminal itself on every return path, so the flag only has to
/// cover the time spent inside the read.
struct SuppressedEcho<'a>(&'a AtomicBool);

impl<'a> SuppressedEcho<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SuppressedEcho<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Installs a SIGINT/SIGTERM handler that turns echo back on if a secret
/// prompt was interrupted, then terminates the process.
pub fn install_interrupt_handler() {
    signal::install();
}

#[cfg(unix)]
mod signal {
    use super::{ECHO_SUPPRESSED, Ordering};

    const INTERRUPTED_EXIT_CODE: libc::c_int = 130;

    pub fn install() {
        let handler = restore_echo_and_exit as extern "C" fn(libc::c_int);

        // SAFETY: the handler only calls async-signal-safe functions.
        unsafe {
            libc::signal(libc::SIGINT, handler as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        }
    }

    extern "C" fn restore_echo_and_exit(_signal: libc::c_int) {
        if ECHO_SUPPRESSED.load(Ordering::SeqCst) {
            // SAFETY: open/tcgetattr/tcsetattr/close are async-signal-safe; a
            // zeroed termios is only written back if tcgetattr filled it.
            unsafe {
                let tty = libc::open(c"/dev/tty".as_ptr(), libc::O_RDWR);

                if tty >= 0 {
                    let mut attrs: libc::termios = std::mem::zeroed();

                    if libc::tcgetattr(tty, &mut attrs) == 0 {
                        attrs.c_lflag |= libc::ECHO;
                        libc::tcsetattr(tty, libc::TCSANOW, &attrs);
                    }

                    libc::close(tty);
                }
            }
        }

        // SAFETY: _exit is async-signal-safe and never returns.
        unsafe { libc::_exit(INTERRUPTED_EXIT_CODE) }
    }
}

#[cfg(not(unix))]
mod signal {
    pub fn install() {}
}

/// A terminal fed from a list of input lines, recording everything printed.
#[cfg(test)]
pub(crate) struct ScriptedTerminal {
    pub input: std::collections::VecDeque<String>,
    pub output: String,
    pub secret_reads: usize,
    pub fail_secret: bool,
    pub reads: usize,
}

#[cfg(test)]
impl ScriptedTerminal {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            input: lines.iter().map(|l| format!("{l}\n")).collect(),
            output: String::new(),
            secret_reads: 0,
            fail_secret: false,
            reads: 0,
        }
    }
}

#[cfg(test)]
impl Terminal for ScriptedTerminal {
    fn print(&mut self, text: &str) -> io::Result<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.reads += 1;
        Ok(self.input.pop_front())
    }

    fn read_secret(&mut self) -> Result<Option<String>, TerminalError> {
        self.secret_reads += 1;

        if self.fail_secret {
            return Err(TerminalError::HiddenInput(io::Error::other(
                "tcsetattr: Input/output error",
            )));
        }

        Ok(self
            .input
            .pop_front()
            .map(|line| line.strip_suffix('\n').unwrap_or(&line).to_string()))
    }
}
