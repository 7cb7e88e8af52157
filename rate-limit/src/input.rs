//! Line sources for the orchestrator channel
//!
//! The orchestrator talks to us one JSON document per line. [`StreamLines`]
//! blocks on a reader directly; [`ChannelLines`] moves the reads onto a
//! thread so a wait can be bounded by a deadline.
//!
//! Lines are raw bytes. Whether invalid UTF-8 is a malformed event or a
//! refused handshake is for the reader of the line to decide.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

pub trait LineSource {
    /// Next line with its terminator stripped; `Ok(None)` at end of input.
    ///
    /// With `timeout` set, an expired wait is an error of kind
    /// [`io::ErrorKind::TimedOut`].
    fn next_line(&mut self, timeout: Option<Duration>) -> io::Result<Option<Vec<u8>>>;
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn next_line(&mut self, timeout: Option<Duration>) -> io::Result<Option<Vec<u8>>> {
        (**self).next_line(timeout)
    }
}

fn strip_terminator(mut line: Vec<u8>) -> Vec<u8> {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    line
}

/// Reads straight from a buffered reader; timeouts are not supported and
/// every wait is unbounded.
pub struct StreamLines<R> {
    reader: R,
}

impl<R: BufRead> StreamLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for StreamLines<R> {
    fn next_line(&mut self, _timeout: Option<Duration>) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(strip_terminator(line)))
    }
}

/// Lines delivered by a background reader thread
pub struct ChannelLines {
    rx: Receiver<io::Result<Vec<u8>>>,
}

impl ChannelLines {
    /// Spawn a thread that forwards every line of `reader`
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.split(b'\n') {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        });
        Self { rx }
    }
}

impl LineSource for ChannelLines {
    fn next_line(&mut self, timeout: Option<Duration>) -> io::Result<Option<Vec<u8>>> {
        let received = match timeout {
            None => self.rx.recv().ok(),
            Some(limit) => match self.rx.recv_timeout(limit) {
                Ok(line) => Some(line),
                Err(RecvTimeoutError::Disconnected) => None,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no line within {}s", limit.as_secs_f64()),
                    ))
                }
            },
        };
        received.transpose().map(|line| line.map(strip_terminator))
    }
}
