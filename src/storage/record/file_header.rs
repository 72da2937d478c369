use crate::common::config::{PageNo, PAGE_SIZE, INVALID_PAGE_NO};
use crate::storage::record::bitmap::bitmap_bytes;

/// Fixed-size header persisted on page 0 of every record file.
///
/// Field order is stable for on-disk compatibility: any change here is a
/// file-format change, not just a struct refactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFileHeader {
    pub record_size: u32,
    pub num_records_per_page: u32,
    pub num_pages: u32,
    pub first_free_page_no: PageNo,
}

pub const HEADER_SIZE: usize = 4 + 4 + 4 + 4;
const PAGE_HEADER_SIZE: usize = 4 + 4;

impl RecordFileHeader {
    /// Derives a header for a fresh record file storing `record_size`-byte
    /// records, picking the largest slot count that fits one page header,
    /// one bitmap, and the slot array within `PAGE_SIZE`.
    pub fn new(record_size: u32) -> Self {
        let mut n = 1u32;
        loop {
            let candidate = n + 1;
            let page_bytes = PAGE_HEADER_SIZE
                + bitmap_bytes(candidate as usize)
                + candidate as usize * record_size as usize;
            if page_bytes > PAGE_SIZE {
                break;
            }
            n = candidate;
        }
        Self {
            record_size,
            num_records_per_page: n,
            num_pages: 1,
            first_free_page_no: INVALID_PAGE_NO,
        }
    }

    pub fn bitmap_len(&self) -> usize {
        bitmap_bytes(self.num_records_per_page as usize)
    }

    pub fn slots_offset(&self) -> usize {
        PAGE_HEADER_SIZE + self.bitmap_len()
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.record_size.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.num_records_per_page.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.num_pages.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.first_free_page_no.to_ne_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            record_size: u32::from_ne_bytes(buf[0..4].try_into().unwrap()),
            num_records_per_page: u32::from_ne_bytes(buf[4..8].try_into().unwrap()),
            num_pages: u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
            first_free_page_no: PageNo::from_ne_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}
