//! Process-level I/O descriptor tables.
//!
//! The `syscall` builtin reads and writes through numbered descriptors.
//! The tables are behind mutexes because builtins are host calls: the VM
//! itself is single-threaded, but the embedder may share one process
//! between a VM and its own threads.

use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Descriptor numbers reserved at startup.
pub const FD_STDOUT: usize = 1;
pub const FD_STDERR: usize = 2;
pub const FD_STDIN: usize = 1;

/// The I/O surface a VM's builtins run against.
///
/// Slot 0 of both tables is reserved as the null descriptor.
pub struct Process {
    readers: Mutex<Vec<Option<Box<dyn Read + Send>>>>,
    writers: Mutex<Vec<Option<Box<dyn Write + Send>>>>,
}

impl Process {
    /// A process wired to the host's standard streams.
    pub fn stdio() -> Arc<Process> {
        let process = Process::detached();
        process.push_reader(Box::new(io::stdin()));
        process.push_writer(Box::new(io::stdout()));
        process.push_writer(Box::new(io::stderr()));
        Arc::new(process)
    }

    /// A process with only the reserved null descriptors. Embedders and
    /// tests attach their own sinks.
    pub fn detached() -> Process {
        Process {
            readers: Mutex::new(vec![None]),
            writers: Mutex::new(vec![None]),
        }
    }

    /// Attach a writer, returning its descriptor number.
    pub fn push_writer(&self, writer: Box<dyn Write + Send>) -> usize {
        let mut writers = self.writers.lock();
        writers.push(Some(writer));
        writers.len() - 1
    }

    /// Attach a reader, returning its descriptor number.
    pub fn push_reader(&self, reader: Box<dyn Read + Send>) -> usize {
        let mut readers = self.readers.lock();
        readers.push(Some(reader));
        readers.len() - 1
    }

    /// Write `data` to descriptor `fd`.
    pub fn write(&self, fd: usize, data: &[u8]) -> io::Result<usize> {
        let mut writers = self.writers.lock();
        let writer = writers
            .get_mut(fd)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| invalid_fd(fd))?;
        writer.write(data)
    }

    /// Read up to `buf.len()` bytes from descriptor `fd`.
    pub fn read(&self, fd: usize, buf: &mut [u8]) -> io::Result<usize> {
        let mut readers = self.readers.lock();
        let reader = readers
            .get_mut(fd)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| invalid_fd(fd))?;
        reader.read(buf)
    }
}

fn invalid_fd(fd: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("invalid syscall descriptor {}", fd),
    )
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("readers", &self.readers.lock().len())
            .field("writers", &self.writers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_descriptor_rejected() {
        let process = Process::detached();
        assert!(process.write(0, b"x").is_err());
        assert!(process.write(7, b"x").is_err());
        let mut buf = [0u8; 4];
        assert!(process.read(0, &mut buf).is_err());
    }

    #[test]
    fn test_attached_writer_receives_bytes() {
        let process = Process::detached();
        let fd = process.push_writer(Box::new(Vec::new()));
        assert_eq!(fd, 1);
        assert_eq!(process.write(fd, b"hello").unwrap(), 5);
    }

    #[test]
    fn test_attached_reader_yields_bytes() {
        let process = Process::detached();
        let fd = process.push_reader(Box::new(&b"data"[..]));
        let mut buf = [0u8; 8];
        let n = process.read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"data");
    }
}
