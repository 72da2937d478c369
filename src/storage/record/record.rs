/// A materialized copy of a tuple's bytes, as returned by `get_record`.
/// Owns its data -- the page it was read from may be unpinned and later
/// evicted without affecting the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
