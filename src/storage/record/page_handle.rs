use crate::common::config::PageNo;
use crate::storage::page::Page;
use crate::storage::record::bitmap;
use crate::storage::record::file_header::RecordFileHeader;

/// A typed view over one resident record-file data page. Borrows the
/// pinned `Page` it wraps and never outlives the caller's pin -- callers
/// must unpin the underlying page through the buffer pool once done with
/// the handle.
pub struct RmPageHandle {
    pub page: Page,
    header: RecordFileHeader,
}

impl RmPageHandle {
    pub fn new(page: Page, header: RecordFileHeader) -> Self {
        Self { page, header }
    }

    pub fn num_records(&self) -> u32 {
        u32::from_ne_bytes(self.page.get_data()[0..4].try_into().unwrap())
    }

    pub fn set_num_records(&self, n: u32) {
        self.page.get_data_mut()[0..4].copy_from_slice(&n.to_ne_bytes());
    }

    pub fn next_free_page_no(&self) -> PageNo {
        PageNo::from_ne_bytes(self.page.get_data()[4..8].try_into().unwrap())
    }

    pub fn set_next_free_page_no(&self, page_no: PageNo) {
        self.page.get_data_mut()[4..8].copy_from_slice(&page_no.to_ne_bytes());
    }

    fn bitmap_range(&self) -> std::ops::Range<usize> {
        8..8 + self.header.bitmap_len()
    }

    pub fn is_slot_set(&self, slot_no: usize) -> bool {
        let range = self.bitmap_range();
        bitmap::is_set(&self.page.get_data()[range], slot_no)
    }

    pub fn set_slot_bit(&self, slot_no: usize) {
        let range = self.bitmap_range();
        bitmap::set(&mut self.page.get_data_mut()[range], slot_no);
    }

    pub fn reset_slot_bit(&self, slot_no: usize) {
        let range = self.bitmap_range();
        bitmap::reset(&mut self.page.get_data_mut()[range], slot_no);
    }

    /// Position of the first unoccupied slot, or `num_records_per_page` if
    /// the page is full.
    pub fn first_free_slot(&self) -> usize {
        let range = self.bitmap_range();
        bitmap::first_bit(
            false,
            &self.page.get_data()[range],
            self.header.num_records_per_page as usize,
        )
    }

    fn slot_range(&self, slot_no: usize) -> std::ops::Range<usize> {
        let start = self.header.slots_offset() + slot_no * self.header.record_size as usize;
        start..start + self.header.record_size as usize
    }

    pub fn get_slot(&self, slot_no: usize) -> Vec<u8> {
        let range = self.slot_range(slot_no);
        self.page.get_data()[range].to_vec()
    }

    pub fn set_slot(&self, slot_no: usize, buf: &[u8]) {
        debug_assert_eq!(buf.len(), self.header.record_size as usize);
        let range = self.slot_range(slot_no);
        self.page.get_data_mut()[range].copy_from_slice(buf);
    }
}
