use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// Where a decoded result set is persisted for random access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreKind {
    /// Growable in-memory buffer.
    #[default]
    Memory,
    /// Anonymous temporary file, removed when the cursor is dropped.
    TempFile,
}

impl StoreKind {
    pub fn open(self) -> Result<BackingStore> {
        match self {
            StoreKind::Memory => Ok(BackingStore::Memory(Cursor::new(Vec::new()))),
            StoreKind::TempFile => Ok(BackingStore::File(tempfile::tempfile()?)),
        }
    }
}

/// Seekable byte store owned by one cursor.
#[derive(Debug)]
pub enum BackingStore {
    Memory(Cursor<Vec<u8>>),
    File(File),
}

impl BackingStore {
    pub fn kind(&self) -> StoreKind {
        match self {
            BackingStore::Memory(_) => StoreKind::Memory,
            BackingStore::File(_) => StoreKind::TempFile,
        }
    }
}

impl Read for BackingStore {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            BackingStore::Memory(inner) => inner.read(buf),
            BackingStore::File(inner) => inner.read(buf),
        }
    }
}

impl Write for BackingStore {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            BackingStore::Memory(inner) => inner.write(buf),
            BackingStore::File(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            BackingStore::Memory(inner) => inner.flush(),
            BackingStore::File(inner) => inner.flush(),
        }
    }
}

impl Seek for BackingStore {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            BackingStore::Memory(inner) => inner.seek(pos),
            BackingStore::File(inner) => inner.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_kinds_support_write_seek_read() {
        for kind in [StoreKind::Memory, StoreKind::TempFile] {
            let mut store = kind.open().unwrap();
            assert_eq!(store.kind(), kind);
            store.write_all(b"0123456789").unwrap();
            store.seek(SeekFrom::Start(4)).unwrap();
            let mut buf = [0u8; 3];
            store.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"456");
        }
    }
}
