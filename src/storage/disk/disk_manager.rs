use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use log::debug;

use crate::common::config::{Fd, PageNo, PAGE_SIZE};
use crate::common::error::{DbError, DbResult};

struct FileEntry {
    file: Mutex<File>,
    /// Next page number `AllocatePage` will hand out for this file.
    next_page_no: PageNo,
}

/// DiskManager takes care of the allocation and deallocation of pages across
/// a small registry of open files. It performs the reading and writing of
/// pages to and from disk, providing a logical file layer within the context
/// of the database engine.
///
/// A single `DiskManager` instance backs every file a table needs -- its
/// record file and its clustered index file each get their own small
/// integer `fd`, handed out by `open_file`, so one buffer pool can serve
/// both through one disk manager.
pub struct DiskManager {
    files: HashMap<Fd, FileEntry>,
    next_fd: Fd,
    num_writes: i32,
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            next_fd: 0,
            num_writes: 0,
        }
    }

    /// Opens (creating if necessary) the file at `path` and registers it
    /// under a fresh `fd`. Existing contents determine the initial
    /// `next_page_no` via `set_fd2pageno`, which callers that reopen an
    /// existing file are expected to call once they've read the file's
    /// header page.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> DbResult<Fd> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .or_else(|_| {
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(&path)
            })?;

        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.insert(
            fd,
            FileEntry {
                file: Mutex::new(file),
                next_page_no: 0,
            },
        );
        Ok(fd)
    }

    fn entry(&self, fd: Fd) -> DbResult<&FileEntry> {
        self.files.get(&fd).ok_or(DbError::FileNotRegistered(fd))
    }

    /// Writes a page to `fd`'s backing file.
    pub fn write_page(&mut self, fd: Fd, page_no: PageNo, page_data: &[u8]) -> DbResult<()> {
        assert_eq!(page_data.len(), PAGE_SIZE);
        let offset = page_no as u64 * PAGE_SIZE as u64;
        self.num_writes += 1;

        let entry = self.entry(fd)?;
        let mut file = entry.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page_data)?;
        file.flush()?;
        Ok(())
    }

    /// Reads a page from `fd`'s backing file. Reads past the current end of
    /// file are tolerated and zero-fill `page_data`, since a freshly
    /// allocated page has no bytes on disk yet.
    pub fn read_page(&mut self, fd: Fd, page_no: PageNo, page_data: &mut [u8]) -> DbResult<()> {
        assert_eq!(page_data.len(), PAGE_SIZE);
        let offset = page_no as u64 * PAGE_SIZE as u64;

        let entry = self.entry(fd)?;
        let mut file = entry.file.lock().unwrap();
        let len = file.metadata()?.len();
        if offset >= len {
            debug!("read past end of file for fd={fd}, page_no={page_no}");
            page_data.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        let read_count = file.read(page_data)?;
        if read_count < PAGE_SIZE {
            page_data[read_count..].fill(0);
        }
        Ok(())
    }

    /// Allocates the next page number for `fd` and advances its counter.
    pub fn allocate_page(&mut self, fd: Fd) -> DbResult<PageNo> {
        let entry = self.files.get_mut(&fd).ok_or(DbError::FileNotRegistered(fd))?;
        let page_no = entry.next_page_no;
        entry.next_page_no += 1;
        Ok(page_no)
    }

    /// Deallocates a page. A no-op: freed page numbers aren't reclaimed by
    /// the disk manager itself, only tracked through the record file's
    /// free-page chain and the index's node bookkeeping.
    pub fn deallocate_page(&mut self, _fd: Fd, _page_no: PageNo) {}

    /// Overrides the next page number `AllocatePage` will hand out for
    /// `fd`. Used when reopening a file whose header already records how
    /// many pages exist.
    pub fn set_fd2pageno(&mut self, fd: Fd, page_no: PageNo) -> DbResult<()> {
        let entry = self.files.get_mut(&fd).ok_or(DbError::FileNotRegistered(fd))?;
        entry.next_page_no = page_no;
        Ok(())
    }

    pub fn get_fd2pageno(&self, fd: Fd) -> DbResult<PageNo> {
        Ok(self.entry(fd)?.next_page_no)
    }

    pub fn get_num_writes(&self) -> i32 {
        self.num_writes
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn read_write_page() {
        let mut buf = [0; PAGE_SIZE];
        let mut data = [0; PAGE_SIZE];

        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let mut dm = DiskManager::new();
        let fd = dm.open_file(&db_file).unwrap();
        let test_str = b"A test string.";
        data[..test_str.len()].copy_from_slice(test_str);

        dm.read_page(fd, 0, &mut buf).unwrap(); // tolerate empty read

        dm.write_page(fd, 0, &data).unwrap();
        dm.read_page(fd, 0, &mut buf).unwrap();
        assert_eq!(buf, data);

        buf.fill(0);
        dm.write_page(fd, 5, &data).unwrap();
        dm.read_page(fd, 5, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn allocate_page_is_sequential_per_fd() {
        let dir = TempDir::new("test").unwrap();
        let mut dm = DiskManager::new();
        let fd_a = dm.open_file(dir.path().join("a.db")).unwrap();
        let fd_b = dm.open_file(dir.path().join("b.db")).unwrap();

        assert_eq!(dm.allocate_page(fd_a).unwrap(), 0);
        assert_eq!(dm.allocate_page(fd_a).unwrap(), 1);
        assert_eq!(dm.allocate_page(fd_b).unwrap(), 0);
        assert_eq!(dm.get_fd2pageno(fd_a).unwrap(), 2);
    }

    #[test]
    fn unregistered_fd_is_an_error() {
        let mut dm = DiskManager::new();
        let mut buf = [0; PAGE_SIZE];
        assert!(dm.read_page(99, 0, &mut buf).is_err());
    }
}
