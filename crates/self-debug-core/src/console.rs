//! User-facing output sink.
//!
//! Everything the pipeline shows the user (banner, analysis, fix notice)
//! goes through a [`Console`]; diagnostics go through `tracing` instead.

use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Line-oriented writer shared by the pipeline stages.
pub struct Console {
    out: Mutex<Box<dyn Write + Send>>,
    color: bool,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Console {
    pub fn new(writer: impl Write + Send + 'static, color: bool) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
            color,
        }
    }

    /// Console on standard output, colored when stdout is a terminal and
    /// `NO_COLOR` is unset.
    pub fn stdout() -> Self {
        let color = io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self::new(io::stdout(), color)
    }

    /// Uncolored console writing into memory.
    pub fn buffered() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(buffer.clone(), false), buffer)
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Write `text` followed by a newline.
    pub fn line(&self, text: impl AsRef<str>) {
        self.write(format!("{}\n", text.as_ref()));
    }

    /// Write `text` as-is and flush.
    pub fn write(&self, text: impl AsRef<str>) {
        let Ok(mut out) = self.out.lock() else {
            warn!("console writer poisoned, dropping output");
            return;
        };
        if let Err(e) = out
            .write_all(text.as_ref().as_bytes())
            .and_then(|()| out.flush())
        {
            warn!(error = %e, "failed to write console output");
        }
    }
}

/// In-memory writer whose contents can be read back after the console is done.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .0
            .lock()
            .map_err(|_| io::Error::other("buffer poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
