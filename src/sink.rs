//! Shared output sinks for target and remote output.
//!
//! Every target in a run writes to the same pair of sinks. A sink is cheap
//! to clone and safe to share across the fan-out tasks.

use std::io::Write;
use std::sync::{Arc, Mutex};

enum SinkKind {
    Stdout,
    Stderr,
    Memory(Vec<u8>),
    Writer(Box<dyn Write + Send>),
}

#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<Mutex<SinkKind>>,
}

impl OutputSink {
    fn from_kind(kind: SinkKind) -> Self {
        Self {
            inner: Arc::new(Mutex::new(kind)),
        }
    }

    /// The process standard output.
    pub fn stdout() -> Self {
        Self::from_kind(SinkKind::Stdout)
    }

    /// The process standard error.
    pub fn stderr() -> Self {
        Self::from_kind(SinkKind::Stderr)
    }

    /// An in-memory buffer, read back with [`OutputSink::contents`].
    pub fn memory() -> Self {
        Self::from_kind(SinkKind::Memory(Vec::new()))
    }

    pub fn writer(w: impl Write + Send + 'static) -> Self {
        Self::from_kind(SinkKind::Writer(Box::new(w)))
    }

    pub fn write_all(&self, buf: &[u8]) -> std::io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::other("output sink poisoned"))?;
        match &mut *guard {
            SinkKind::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(buf)?;
                out.flush()
            }
            SinkKind::Stderr => {
                let mut err = std::io::stderr().lock();
                err.write_all(buf)?;
                err.flush()
            }
            SinkKind::Memory(bytes) => {
                bytes.extend_from_slice(buf);
                Ok(())
            }
            SinkKind::Writer(w) => {
                w.write_all(buf)?;
                w.flush()
            }
        }
    }

    pub fn write_str(&self, s: &str) -> std::io::Result<()> {
        self.write_all(s.as_bytes())
    }

    /// Contents written so far. Empty for anything but a memory sink.
    pub fn contents(&self) -> String {
        match self.inner.lock() {
            Ok(guard) => match &*guard {
                SinkKind::Memory(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                _ => String::new(),
            },
            Err(_) => String::new(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock()
            && let SinkKind::Memory(bytes) = &mut *guard
        {
            bytes.clear();
        }
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OutputSink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shared_between_clones() {
        let sink = OutputSink::memory();
        let other = sink.clone();
        sink.write_str("a\n").unwrap();
        other.write_str("b\n").unwrap();
        assert_eq!(sink.contents(), "a\nb\n");
        sink.clear();
        assert_eq!(other.contents(), "");
    }
}
