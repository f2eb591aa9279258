//! Byte sources behind an image identifier.
//!
//! A [`RandomAccessByteSource`] declares whether it can serve arbitrary
//! ranges. Decoders check [`SourceCapabilities`] and either read ranges or
//! buffer the whole source; no per-codec seek emulation is needed.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::ImageFormat;
use tracing::debug;

use super::DecodeError;

/// Bytes read to sniff the container format.
const SNIFF_LEN: u64 = 64;

/// What a byte source can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// `read_range` works at any offset.
    pub seekable: bool,
}

/// Byte-addressable image data.
pub trait RandomAccessByteSource: Send + Sync {
    fn capabilities(&self) -> SourceCapabilities;

    /// Total length, if known without reading everything.
    fn len(&self) -> io::Result<Option<u64>>;

    /// Read up to `len` bytes at `offset`. Sequential sources return
    /// [`io::ErrorKind::Unsupported`].
    fn read_range(&self, offset: u64, len: u64) -> io::Result<Vec<u8>>;

    /// Read the entire source.
    fn read_to_end(&self) -> io::Result<Vec<u8>>;
}

/// In-memory bytes.
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl RandomAccessByteSource for MemorySource {
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities { seekable: true }
    }

    fn len(&self) -> io::Result<Option<u64>> {
        Ok(Some(self.bytes.len() as u64))
    }

    fn read_range(&self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let start = (offset as usize).min(self.bytes.len());
        let end = start.saturating_add(len as usize).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }

    fn read_to_end(&self) -> io::Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }
}

/// A file on disk.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("file handle lock poisoned"))
    }
}

impl RandomAccessByteSource for FileSource {
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities { seekable: true }
    }

    fn len(&self) -> io::Result<Option<u64>> {
        Ok(Some(self.lock()?.metadata()?.len()))
    }

    fn read_range(&self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        (&mut *file).take(len).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// A forward-only stream, buffered in full on first access.
pub struct SequentialSource {
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    buffer: Mutex<Option<Arc<[u8]>>>,
}

impl SequentialSource {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Mutex::new(Some(Box::new(reader))),
            buffer: Mutex::new(None),
        }
    }

    fn buffered(&self) -> io::Result<Arc<[u8]>> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| io::Error::other("buffer lock poisoned"))?;
        if let Some(bytes) = buffer.as_ref() {
            return Ok(Arc::clone(bytes));
        }

        let mut reader = self
            .reader
            .lock()
            .map_err(|_| io::Error::other("reader lock poisoned"))?;
        let mut stream = reader
            .take()
            .ok_or_else(|| io::Error::other("stream already consumed"))?;
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;

        let bytes: Arc<[u8]> = bytes.into();
        *buffer = Some(Arc::clone(&bytes));
        Ok(bytes)
    }
}

impl RandomAccessByteSource for SequentialSource {
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities { seekable: false }
    }

    fn len(&self) -> io::Result<Option<u64>> {
        Ok(None)
    }

    fn read_range(&self, _offset: u64, _len: u64) -> io::Result<Vec<u8>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sequential source cannot serve ranges",
        ))
    }

    fn read_to_end(&self) -> io::Result<Vec<u8>> {
        Ok(self.buffered()?.to_vec())
    }
}

/// An identified image source.
///
/// The container format is detected at most once per source and cached.
pub struct ImageSource {
    id: String,
    bytes: Box<dyn RandomAccessByteSource>,
    format: Mutex<Option<ImageFormat>>,
}

impl ImageSource {
    pub fn new(id: impl Into<String>, bytes: impl RandomAccessByteSource + 'static) -> Self {
        Self {
            id: id.into(),
            bytes: Box::new(bytes),
            format: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bytes(&self) -> &dyn RandomAccessByteSource {
        self.bytes.as_ref()
    }

    /// Detected container format.
    pub fn format(&self) -> Result<ImageFormat, DecodeError> {
        let mut cached = self
            .format
            .lock()
            .map_err(|_| DecodeError::Io(io::Error::other("format cache lock poisoned")))?;
        if let Some(format) = *cached {
            return Ok(format);
        }

        let head = if self.bytes.capabilities().seekable {
            self.bytes.read_range(0, SNIFF_LEN)?
        } else {
            self.bytes.read_to_end()?
        };
        let format = image::guess_format(&head).map_err(|e| DecodeError::NotDecodable {
            id: self.id.clone(),
            reason: e.to_string(),
        })?;

        debug!(id = %self.id, ?format, "Detected source format");
        *cached = Some(format);
        Ok(format)
    }
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSource")
            .field("id", &self.id)
            .field("capabilities", &self.bytes.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    /// Memory source that counts range reads.
    struct CountingSource {
        inner: MemorySource,
        reads: Arc<AtomicUsize>,
    }

    impl RandomAccessByteSource for CountingSource {
        fn capabilities(&self) -> SourceCapabilities {
            self.inner.capabilities()
        }

        fn len(&self) -> io::Result<Option<u64>> {
            self.inner.len()
        }

        fn read_range(&self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_range(offset, len)
        }

        fn read_to_end(&self) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_to_end()
        }
    }

    #[test]
    fn test_memory_source_ranges() {
        let source = MemorySource::new(vec![1u8, 2, 3, 4, 5]);
        assert_eq!(source.read_range(1, 2).unwrap(), vec![2, 3]);
        assert_eq!(source.read_range(3, 100).unwrap(), vec![4, 5]);
        assert_eq!(source.read_range(10, 2).unwrap(), Vec::<u8>::new());
        assert_eq!(source.len().unwrap(), Some(5));
    }

    #[test]
    fn test_sequential_source_rejects_ranges() {
        let source = SequentialSource::new(io::Cursor::new(vec![1u8, 2, 3]));
        assert!(!source.capabilities().seekable);
        let err = source.read_range(0, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_sequential_source_buffers_once() {
        let source = SequentialSource::new(io::Cursor::new(vec![7u8, 8, 9]));
        assert_eq!(source.read_to_end().unwrap(), vec![7, 8, 9]);
        // Second read is served from the buffer.
        assert_eq!(source.read_to_end().unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_file_source() {
        let path = std::env::temp_dir().join(format!("iiif-core-source-{}.bin", std::process::id()));
        std::fs::write(&path, b"abcdef").unwrap();

        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.len().unwrap(), Some(6));
        assert_eq!(source.read_range(2, 3).unwrap(), b"cde".to_vec());
        assert_eq!(source.read_to_end().unwrap(), b"abcdef".to_vec());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_format_detected_at_most_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = ImageSource::new(
            "img",
            CountingSource {
                inner: MemorySource::new(PNG_MAGIC.to_vec()),
                reads: Arc::clone(&reads),
            },
        );

        assert_eq!(source.format().unwrap(), ImageFormat::Png);
        assert_eq!(source.format().unwrap(), ImageFormat::Png);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_format_not_decodable() {
        let source = ImageSource::new("junk", MemorySource::new(b"not an image".to_vec()));
        assert!(matches!(
            source.format(),
            Err(DecodeError::NotDecodable { .. })
        ));
    }
}
