//! Crate-wide error taxonomy.
//!
//! Only conditions that are genuinely exceptional (I/O failure, a page that
//! should exist but doesn't, an index position that has fallen off the end
//! of a leaf) are `DbError`s. Outcomes the spec treats as ordinary,
//! caller-checked results -- an unpin of an already-zero pin count, a
//! duplicate-key insert that's silently a no-op -- stay as `bool`/`Option`
//! returns on the relevant methods rather than being wrapped here.

use crate::common::config::{Fd, PageNo};

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("page does not exist: fd={fd}, page_no={page_no}")]
    PageNotExist { fd: Fd, page_no: PageNo },

    #[error("index entry not found")]
    IndexEntryNotFound,

    #[error("file not registered with disk manager: fd={0}")]
    FileNotRegistered(Fd),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;
