// Block-addressed file access: the bottom layer of the storage stack.
//
// A database is one OS directory; each table lives in its own file and the
// log is one more file in that directory. Every block is exactly
// `block_size` bytes. `FileMgr` is the sole owner of the directory: it opens
// files lazily, keeps them open for its own lifetime, and serializes every
// read/write/append/length call behind one mutex.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{DbError, Result};

/// Addresses the `blknum`-th block of `filename`. A plain value type: two
/// `BlockId`s are equal iff both fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub filename: String,
    pub blknum: i32,
}

impl BlockId {
    pub fn new(filename: impl Into<String>, blknum: i32) -> Self {
        Self {
            filename: filename.into(),
            blknum,
        }
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[file {}, block {}]", self.filename, self.blknum)
    }
}

/// A mutable, fixed-size byte buffer with typed accessors.
///
/// Integers are little-endian signed 32-bit. Byte/string fields are stored
/// as a 4-byte unsigned LE length prefix followed by the raw bytes; strings
/// are the UTF-8 encoding of the value. `max_length` gives the worst-case
/// byte count a string of `n` Unicode code points can need (4 bytes per code
/// unit covers the worst-case UTF-8 expansion).
#[derive(Debug, Clone)]
pub struct Page {
    buffer: Vec<u8>,
}

impl Page {
    pub fn new(block_size: usize) -> Self {
        Self {
            buffer: vec![0u8; block_size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { buffer: bytes }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn contents(&self) -> &[u8] {
        &self.buffer
    }

    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn get_int(&self, offset: usize) -> i32 {
        let bytes: [u8; 4] = self.buffer[offset..offset + 4].try_into().unwrap();
        i32::from_le_bytes(bytes)
    }

    pub fn set_int(&mut self, offset: usize, n: i32) {
        self.buffer[offset..offset + 4].copy_from_slice(&n.to_le_bytes());
    }

    pub fn get_bytes(&self, offset: usize) -> Vec<u8> {
        let len_bytes: [u8; 4] = self.buffer[offset..offset + 4].try_into().unwrap();
        let len = u32::from_le_bytes(len_bytes) as usize;
        self.buffer[offset + 4..offset + 4 + len].to_vec()
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) {
        let len = bytes.len() as u32;
        self.buffer[offset..offset + 4].copy_from_slice(&len.to_le_bytes());
        self.buffer[offset + 4..offset + 4 + bytes.len()].copy_from_slice(bytes);
    }

    pub fn get_string(&self, offset: usize) -> String {
        String::from_utf8(self.get_bytes(offset)).expect("page string is not valid utf-8")
    }

    pub fn set_string(&mut self, offset: usize, s: &str) {
        self.set_bytes(offset, s.as_bytes());
    }

    /// Worst-case byte count for a string of `strlen` Unicode code points.
    pub fn max_length(strlen: usize) -> usize {
        4 + strlen * 4
    }
}

/// Exclusive owner of a database directory: opens files lazily, creates the
/// directory if it doesn't exist (recording `is_new`), and deletes any
/// leftover scratch file whose name starts with `temp`.
pub struct FileMgr {
    db_directory: PathBuf,
    block_size: usize,
    is_new: bool,
    open_files: Mutex<HashMap<String, File>>,
}

impl FileMgr {
    pub fn new(db_directory: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        let db_directory = db_directory.as_ref().to_path_buf();
        let is_new = !db_directory.exists();
        if is_new {
            fs::create_dir_all(&db_directory)?;
        }

        for entry in fs::read_dir(&db_directory)? {
            let entry = entry?;
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with("temp")
            {
                fs::remove_file(entry.path())?;
            }
        }

        Ok(Self {
            db_directory,
            block_size,
            is_new,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Reads into `page`, leaving bytes past end-of-file zeroed rather than
    /// erroring — a block an `append` has reserved but nothing has written
    /// yet reads back as all zeros.
    pub fn read(&self, blk: &BlockId, page: &mut Page) -> Result<()> {
        let mut open_files = self.open_files.lock();
        let f = Self::get_file(&self.db_directory, &mut open_files, &blk.filename)?;
        f.seek(SeekFrom::Start((blk.blknum as u64) * self.block_size as u64))
            .map_err(|_| DbError::Internal(format!("cannot read block {blk}")))?;
        let buf = page.contents_mut();
        buf.fill(0);
        let mut filled = 0;
        while filled < buf.len() {
            match f.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(DbError::Internal(format!("cannot read block {blk}"))),
            }
        }
        Ok(())
    }

    pub fn write(&self, blk: &BlockId, page: &Page) -> Result<()> {
        let mut open_files = self.open_files.lock();
        let f = Self::get_file(&self.db_directory, &mut open_files, &blk.filename)?;
        f.seek(SeekFrom::Start((blk.blknum as u64) * self.block_size as u64))
            .map_err(|_| DbError::Internal(format!("cannot write block {blk}")))?;
        f.write_all(page.contents())
            .map_err(|_| DbError::Internal(format!("cannot write block {blk}")))?;
        Ok(())
    }

    pub fn append(&self, filename: &str) -> Result<BlockId> {
        let mut open_files = self.open_files.lock();
        let newblknum = Self::length_locked(&self.db_directory, &mut open_files, filename, self.block_size)?;
        let blk = BlockId::new(filename, newblknum as i32);
        let zeros = vec![0u8; self.block_size];
        let f = Self::get_file(&self.db_directory, &mut open_files, filename)?;
        f.seek(SeekFrom::Start((blk.blknum as u64) * self.block_size as u64))
            .map_err(|_| DbError::Internal(format!("cannot append block {blk}")))?;
        f.write_all(&zeros)
            .map_err(|_| DbError::Internal(format!("cannot append block {blk}")))?;
        Ok(blk)
    }

    pub fn length(&self, filename: &str) -> Result<usize> {
        let mut open_files = self.open_files.lock();
        Self::length_locked(&self.db_directory, &mut open_files, filename, self.block_size)
    }

    fn length_locked(
        db_directory: &Path,
        open_files: &mut HashMap<String, File>,
        filename: &str,
        block_size: usize,
    ) -> Result<usize> {
        let f = Self::get_file(db_directory, open_files, filename)?;
        let len = f
            .metadata()
            .map_err(|_| DbError::Internal(format!("cannot access {filename}")))?
            .len();
        assert_eq!(len % block_size as u64, 0, "file {filename} is not block-aligned");
        Ok((len / block_size as u64) as usize)
    }

    fn get_file<'a>(
        db_directory: &Path,
        open_files: &'a mut HashMap<String, File>,
        filename: &str,
    ) -> Result<&'a mut File> {
        if !open_files.contains_key(filename) {
            let path = db_directory.join(filename);
            let f = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            open_files.insert(filename.to_string(), f);
        }
        Ok(open_files.get_mut(filename).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn page_round_trip() {
        let mut p1 = Page::new(400);
        p1.set_string(88, "abcdefghijklm");
        let sz = Page::max_length("abcdefghijklm".chars().count());
        assert_eq!(sz, 56);
        p1.set_int(144, 345);

        let dir = TempDir::new().unwrap();
        let fm = FileMgr::new(dir.path(), 400).unwrap();
        let blk = BlockId::new("testfile", 2);
        fm.write(&blk, &p1).unwrap();

        let mut p2 = Page::new(400);
        fm.read(&blk, &mut p2).unwrap();
        assert_eq!(p2.get_string(88), "abcdefghijklm");
        assert_eq!(p2.get_int(144), 345);
    }

    #[test]
    fn append_grows_file_by_one_block() {
        let dir = TempDir::new().unwrap();
        let fm = FileMgr::new(dir.path(), 400).unwrap();
        assert_eq!(fm.length("f").unwrap(), 0);
        fm.append("f").unwrap();
        fm.append("f").unwrap();
        assert_eq!(fm.length("f").unwrap(), 2);
        let on_disk = fs::metadata(dir.path().join("f")).unwrap().len();
        assert_eq!(on_disk, fm.length("f").unwrap() as u64 * 400);
    }

    #[test]
    fn fresh_directory_is_new_and_existing_is_not() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("db");
        {
            let fm = FileMgr::new(&sub, 400).unwrap();
            assert!(fm.is_new());
        }
        let fm2 = FileMgr::new(&sub, 400).unwrap();
        assert!(!fm2.is_new());
    }

    #[test]
    fn temp_files_are_swept_on_startup() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tempscratch"), b"x").unwrap();
        fs::write(dir.path().join("keepme"), b"x").unwrap();
        FileMgr::new(dir.path(), 400).unwrap();
        assert!(!dir.path().join("tempscratch").exists());
        assert!(dir.path().join("keepme").exists());
    }
}
