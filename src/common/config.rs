//! Compile-time layout constants shared by every storage component.

/// Size in bytes of a single on-disk/in-memory page.
pub const PAGE_SIZE: usize = 4096;

/// A frame is a slot in the buffer pool's `pages` array.
pub type FrameId = u32;

/// A page number within a single file, assigned sequentially starting at 0.
pub type PageNo = i32;

/// A small integer handed out by the disk manager when a file is registered.
/// Distinct files (a table's record file, its index file) get distinct fds
/// from the same `DiskManager` instance.
pub type Fd = i32;

/// `PageNo` value meaning "no page" (end of a free list, absent parent, ...).
pub const INVALID_PAGE_NO: PageNo = -1;

/// `Fd` value meaning "not a registered file".
pub const INVALID_FD: Fd = -1;

/// Identifies a page uniquely across every file a `DiskManager` has open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub fd: Fd,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(fd: Fd, page_no: PageNo) -> Self {
        Self { fd, page_no }
    }
}

pub const INVALID_PAGE_ID: PageId = PageId {
    fd: INVALID_FD,
    page_no: INVALID_PAGE_NO,
};

/// Record identifier: the slot of a tuple within the record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub page_no: PageNo,
    pub slot_no: i32,
}

impl Rid {
    pub fn new(page_no: PageNo, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

/// Index-internal position identifier: a slot within a B+-tree leaf page.
/// Distinct from `Rid` even though both are `(page_no, slot_no)` pairs --
/// an `Iid` is only meaningful relative to the index file, and must be
/// translated to a `Rid` via `IndexHandle::get_rid` before it leaves the
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Iid {
    pub page_no: PageNo,
    pub slot_no: i32,
}

impl Iid {
    pub fn new(page_no: PageNo, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

pub type TransactionId = u32;
