use std::sync::{Arc, Mutex};

use tracing::instrument;

use crate::buffer::BufferPoolManager;
use crate::common::config::{PageId, PageNo, Rid, INVALID_PAGE_NO};
use crate::common::error::{DbError, DbResult};
use crate::storage::record::file_header::{RecordFileHeader, HEADER_SIZE};
use crate::storage::record::page_handle::RmPageHandle;
use crate::storage::record::record::Record;

/// A slotted record file: fixed-size tuples stored in per-page bitmaps,
/// with a singly linked free-page chain threaded through page headers.
///
/// Every public operation here pins at most one page through the buffer
/// pool and unpins it on every exit path -- including error paths -- per
/// the pin-discipline contract the buffer pool depends on.
pub struct RmFileHandle {
    fd: i32,
    bpm: Arc<BufferPoolManager>,
    file_hdr: Mutex<RecordFileHeader>,
}

impl RmFileHandle {
    /// Creates a fresh record file at `path` storing `record_size`-byte
    /// records, materializing its header page (page 0).
    pub fn create<P: AsRef<std::path::Path>>(
        bpm: Arc<BufferPoolManager>,
        path: P,
        record_size: u32,
    ) -> DbResult<Self> {
        let fd = bpm.open_file(path)?;
        let header = RecordFileHeader::new(record_size);

        let header_page = bpm
            .new_page(fd)
            .ok_or(DbError::PageNotExist { fd, page_no: 0 })?;
        debug_assert_eq!(header_page.get_page_id().unwrap().page_no, 0);
        header_page.get_data_mut()[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        bpm.unpin_page(header_page.get_page_id().unwrap(), true);
        bpm.flush_page(header_page.get_page_id().unwrap());

        Ok(Self {
            fd,
            bpm,
            file_hdr: Mutex::new(header),
        })
    }

    /// Reopens an existing record file, reading its header from page 0.
    pub fn open<P: AsRef<std::path::Path>>(bpm: Arc<BufferPoolManager>, path: P) -> DbResult<Self> {
        let fd = bpm.open_file(path)?;
        let header_page = bpm
            .fetch_page(PageId::new(fd, 0))
            .ok_or(DbError::PageNotExist { fd, page_no: 0 })?;
        let header = RecordFileHeader::from_bytes(&header_page.get_data()[0..HEADER_SIZE]);
        bpm.unpin_page(header_page.get_page_id().unwrap(), false);
        bpm.set_fd2pageno(fd, header.num_pages as PageNo)?;

        Ok(Self {
            fd,
            bpm,
            file_hdr: Mutex::new(header),
        })
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn record_size(&self) -> u32 {
        self.file_hdr.lock().unwrap().record_size
    }

    fn fetch_page_handle(&self, page_no: PageNo) -> DbResult<RmPageHandle> {
        let page_id = PageId::new(self.fd, page_no);
        let page = self
            .bpm
            .fetch_page(page_id)
            .ok_or(DbError::PageNotExist { fd: self.fd, page_no })?;
        let header = *self.file_hdr.lock().unwrap();
        Ok(RmPageHandle::new(page, header))
    }

    fn create_new_page_handle(&self) -> DbResult<RmPageHandle> {
        let page = self
            .bpm
            .new_page(self.fd)
            .ok_or(DbError::PageNotExist { fd: self.fd, page_no: -1 })?;
        let mut hdr = self.file_hdr.lock().unwrap();
        let page_handle = RmPageHandle::new(page.clone(), *hdr);
        page_handle.set_next_free_page_no(hdr.first_free_page_no);
        page_handle.set_num_records(0);
        hdr.first_free_page_no = page.get_page_id().unwrap().page_no;
        // The counter must only reflect pages that were actually allocated;
        // bumping it before `new_page` succeeds would leave it ahead of
        // reality if allocation failed.
        hdr.num_pages += 1;
        Ok(page_handle)
    }

    /// Returns the head of the free-page chain, creating a new page if the
    /// chain is empty.
    fn create_page_handle(&self) -> DbResult<RmPageHandle> {
        let first_free = self.file_hdr.lock().unwrap().first_free_page_no;
        if first_free == INVALID_PAGE_NO {
            self.create_new_page_handle()
        } else {
            self.fetch_page_handle(first_free)
        }
    }

    fn release_page_handle(&self, page_handle: &RmPageHandle) {
        let mut hdr = self.file_hdr.lock().unwrap();
        page_handle.set_next_free_page_no(hdr.first_free_page_no);
        hdr.first_free_page_no = page_handle.page.get_page_id().unwrap().page_no;
    }

    fn unpin(&self, page_handle: &RmPageHandle, is_dirty: bool) {
        self.bpm
            .unpin_page(page_handle.page.get_page_id().unwrap(), is_dirty);
    }

    #[instrument(skip(self, buf))]
    pub fn insert_record(&self, buf: &[u8]) -> DbResult<Rid> {
        let page_handle = self.create_page_handle()?;
        let num_records_per_page = self.file_hdr.lock().unwrap().num_records_per_page as usize;
        let slot_no = page_handle.first_free_slot();
        assert!(
            slot_no < num_records_per_page,
            "create_page_handle returned a page with no free slot"
        );

        page_handle.set_slot(slot_no, buf);
        page_handle.set_slot_bit(slot_no);
        page_handle.set_num_records(page_handle.num_records() + 1);
        if page_handle.num_records() as usize >= num_records_per_page {
            let mut hdr = self.file_hdr.lock().unwrap();
            hdr.first_free_page_no = page_handle.next_free_page_no();
        }

        let page_no = page_handle.page.get_page_id().unwrap().page_no;
        self.unpin(&page_handle, true);
        Ok(Rid::new(page_no, slot_no as i32))
    }

    #[instrument(skip(self))]
    pub fn delete_record(&self, rid: Rid) -> DbResult<()> {
        let page_handle = self.fetch_page_handle(rid.page_no)?;
        if !page_handle.is_slot_set(rid.slot_no as usize) {
            self.unpin(&page_handle, false);
            return Ok(());
        }

        page_handle.reset_slot_bit(rid.slot_no as usize);
        page_handle.set_slot(rid.slot_no as usize, &vec![0u8; self.file_hdr.lock().unwrap().record_size as usize]);
        let remaining = page_handle.num_records() - 1;
        page_handle.set_num_records(remaining);
        let num_records_per_page = self.file_hdr.lock().unwrap().num_records_per_page;
        if remaining == num_records_per_page - 1 {
            self.release_page_handle(&page_handle);
        }
        self.unpin(&page_handle, true);
        Ok(())
    }

    #[instrument(skip(self, buf))]
    pub fn update_record(&self, rid: Rid, buf: &[u8]) -> DbResult<()> {
        let page_handle = self.fetch_page_handle(rid.page_no)?;
        page_handle.set_slot(rid.slot_no as usize, buf);
        self.unpin(&page_handle, true);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_record(&self, rid: Rid) -> DbResult<Record> {
        let page_handle = self.fetch_page_handle(rid.page_no)?;
        let data = page_handle.get_slot(rid.slot_no as usize);
        self.unpin(&page_handle, false);
        Ok(Record::new(data))
    }

    /// Rollback form of insert, placing a record at a specific `rid`
    /// instead of the next free slot. Used by the transaction manager to
    /// undo a `delete_record`.
    ///
    /// A new page is materialized only when the target page does not yet
    /// exist (`rid.page_no >= num_pages`) -- the reverse of the condition
    /// would create a redundant page for every rollback onto an existing
    /// page, and fail to grow the file when the target page was the one
    /// just freed by `AdjustRoot`-style page release.
    #[instrument(skip(self, buf))]
    pub fn insert_record_at(&self, rid: Rid, buf: &[u8]) -> DbResult<()> {
        let num_pages = self.file_hdr.lock().unwrap().num_pages;
        if rid.page_no as u32 >= num_pages {
            let new_page_handle = self.create_new_page_handle()?;
            self.unpin(&new_page_handle, true);
        }

        let page_handle = self.fetch_page_handle(rid.page_no)?;
        page_handle.set_slot_bit(rid.slot_no as usize);
        let num_records = page_handle.num_records() + 1;
        page_handle.set_num_records(num_records);
        let num_records_per_page = self.file_hdr.lock().unwrap().num_records_per_page;
        if num_records == num_records_per_page {
            let mut hdr = self.file_hdr.lock().unwrap();
            hdr.first_free_page_no = page_handle.next_free_page_no();
        }
        page_handle.set_slot(rid.slot_no as usize, buf);
        self.unpin(&page_handle, true);
        Ok(())
    }

    /// Persists the in-memory header back to page 0 and flushes it.
    pub fn flush_header(&self) -> DbResult<()> {
        let header_page = self
            .bpm
            .fetch_page(PageId::new(self.fd, 0))
            .ok_or(DbError::PageNotExist { fd: self.fd, page_no: 0 })?;
        let header = *self.file_hdr.lock().unwrap();
        header_page.get_data_mut()[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        self.bpm.unpin_page(header_page.get_page_id().unwrap(), true);
        self.bpm.flush_page(header_page.get_page_id().unwrap());
        Ok(())
    }
}
