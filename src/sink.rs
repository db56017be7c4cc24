//! Byte sinks consumed by the external transcoder.
//!
//! Each media loop owns exactly one sink; the external consumer process
//! reads the other end. Delivery is best-effort per frame: a failed write is
//! logged and the loop keeps going, because the consumer's own exit is the
//! authoritative failure signal.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Byte-oriented destination for one media kind. Object-safe so tests can
/// substitute an in-memory sink for the named pipes.
pub trait ByteSink: Send {
    fn write_chunk(&mut self, payload: &[u8]) -> io::Result<()>;
    /// Close the sink. Must be idempotent.
    fn close(&mut self);
}

/// A named pipe (FIFO) on the local filesystem.
///
/// Created before the consumer process starts and opened read+write, so the
/// open never blocks waiting for a reader, the same trick the transcoder
/// pipeline has always relied on for startup ordering.
pub struct FifoSink {
    path: PathBuf,
    writer: Option<File>,
}

impl FifoSink {
    /// Create the FIFO node if it does not exist yet. The parent directory is
    /// created as needed.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if !path.exists() {
            make_fifo(&path)?;
            log::info!("created fifo {}", path.display());
        }
        Ok(Self { path, writer: None })
    }

    /// Open the pipe for writing. Idempotent; reopening an open sink is a
    /// no-op.
    pub fn open(&mut self) -> io::Result<()> {
        if self.writer.is_none() {
            let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
            self.writer = Some(file);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl ByteSink for FifoSink {
    fn write_chunk(&mut self, payload: &[u8]) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(payload),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "sink is not open",
            )),
        }
    }

    fn close(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            log::info!("closed fifo {}", self.path.display());
        }
    }
}

impl Drop for FifoSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
fn make_fifo(path: &Path) -> io::Result<()> {
    use nix::sys::stat::Mode;
    nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o644))
        .map_err(|e| io::Error::from_raw_os_error(e as i32))
}

#[cfg(not(unix))]
fn make_fifo(_path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named pipes are only supported on unix",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;

    #[test]
    fn create_makes_a_fifo_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio_fifo");
        let sink = FifoSink::create(&path).unwrap();
        assert_eq!(sink.path(), path.as_path());

        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn create_is_idempotent_for_an_existing_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_fifo");
        let _first = FifoSink::create(&path).unwrap();
        let _second = FifoSink::create(&path).unwrap();
    }

    #[test]
    fn open_write_close_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        let mut sink = FifoSink::create(&path).unwrap();

        sink.open().unwrap();
        assert!(sink.is_open());
        sink.write_chunk(b"frame-bytes").unwrap();

        sink.close();
        assert!(!sink.is_open());
        // Idempotent close.
        sink.close();
    }

    #[test]
    fn writing_to_an_unopened_sink_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FifoSink::create(dir.path().join("fifo")).unwrap();
        let err = sink.write_chunk(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
