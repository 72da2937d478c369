use crate::common::config::{PageNo, Rid, INVALID_PAGE_NO};
use crate::storage::index::file_header::{ColType, IndexFileHeader};
use crate::storage::page::Page;

/// is_leaf(1) + num_key(4) + parent(4) + prev_leaf(4) + next_leaf(4) + next_free_page_no(4)
pub const NODE_HEADER_SIZE: usize = 1 + 4 + 4 + 4 + 4 + 4;
const RID_SIZE: usize = 8;

/// A typed view over one resident index page, either a leaf or an
/// internal node. Which one it is is a runtime flag (`is_leaf`), not a
/// separate Rust type, since split/coalesce/redistribute all move pages
/// between the two roles in place.
///
/// For leaves, `rid[i]` is the row identifier `key[i]` points to. For
/// internal nodes, `rid[i]` is the page number of the child reached when
/// a search key is grouped with `key[i]`; `key[0]` on an internal node
/// is a copy of its leftmost descendant leaf's minimum key and is never
/// searched past (see `upper_bound`).
#[derive(Clone)]
pub struct IxNodeHandle {
    pub page: Page,
    header: IndexFileHeader,
}

impl IxNodeHandle {
    pub fn new(page: Page, header: IndexFileHeader) -> Self {
        Self { page, header }
    }

    pub fn clone_handle(&self) -> Self {
        self.clone()
    }

    pub fn page_no(&self) -> PageNo {
        self.page.get_page_id().unwrap().page_no
    }

    fn col_len(&self) -> usize {
        self.header.col_len as usize
    }

    fn col_type(&self) -> ColType {
        self.header.col_type
    }

    pub fn max_size(&self) -> usize {
        self.header.btree_order as usize
    }

    pub fn is_leaf(&self) -> bool {
        self.page.get_data()[0] != 0
    }

    pub fn set_is_leaf(&self, is_leaf: bool) {
        self.page.get_data_mut()[0] = is_leaf as u8;
    }

    pub fn num_key(&self) -> usize {
        u32::from_ne_bytes(self.page.get_data()[1..5].try_into().unwrap()) as usize
    }

    pub fn set_num_key(&self, n: usize) {
        self.page.get_data_mut()[1..5].copy_from_slice(&(n as u32).to_ne_bytes());
    }

    pub fn parent(&self) -> PageNo {
        PageNo::from_ne_bytes(self.page.get_data()[5..9].try_into().unwrap())
    }

    pub fn set_parent(&self, page_no: PageNo) {
        self.page.get_data_mut()[5..9].copy_from_slice(&page_no.to_ne_bytes());
    }

    pub fn prev_leaf(&self) -> PageNo {
        PageNo::from_ne_bytes(self.page.get_data()[9..13].try_into().unwrap())
    }

    pub fn set_prev_leaf(&self, page_no: PageNo) {
        self.page.get_data_mut()[9..13].copy_from_slice(&page_no.to_ne_bytes());
    }

    pub fn next_leaf(&self) -> PageNo {
        PageNo::from_ne_bytes(self.page.get_data()[13..17].try_into().unwrap())
    }

    pub fn set_next_leaf(&self, page_no: PageNo) {
        self.page.get_data_mut()[13..17].copy_from_slice(&page_no.to_ne_bytes());
    }

    pub fn next_free_page_no(&self) -> PageNo {
        PageNo::from_ne_bytes(self.page.get_data()[17..21].try_into().unwrap())
    }

    pub fn set_next_free_page_no(&self, page_no: PageNo) {
        self.page.get_data_mut()[17..21].copy_from_slice(&page_no.to_ne_bytes());
    }

    fn keys_offset(&self) -> usize {
        NODE_HEADER_SIZE
    }

    fn rids_offset(&self) -> usize {
        self.keys_offset() + self.max_size() * self.col_len()
    }

    fn key_range(&self, i: usize) -> std::ops::Range<usize> {
        let start = self.keys_offset() + i * self.col_len();
        start..start + self.col_len()
    }

    fn rid_range(&self, i: usize) -> std::ops::Range<usize> {
        let start = self.rids_offset() + i * RID_SIZE;
        start..start + RID_SIZE
    }

    pub fn key_at(&self, i: usize) -> Vec<u8> {
        let range = self.key_range(i);
        self.page.get_data()[range].to_vec()
    }

    fn set_key_raw(&self, i: usize, key: &[u8]) {
        let range = self.key_range(i);
        self.page.get_data_mut()[range].copy_from_slice(key);
    }

    pub fn set_key_at(&self, i: usize, key: Vec<u8>) {
        self.set_key_raw(i, &key);
    }

    pub fn rid_at(&self, i: usize) -> Rid {
        let range = self.rid_range(i);
        let buf = &self.page.get_data()[range];
        Rid::new(
            PageNo::from_ne_bytes(buf[0..4].try_into().unwrap()),
            i32::from_ne_bytes(buf[4..8].try_into().unwrap()),
        )
    }

    fn set_rid_raw(&self, i: usize, rid: Rid) {
        let range = self.rid_range(i);
        let buf = &mut self.page.get_data_mut()[range];
        buf[0..4].copy_from_slice(&rid.page_no.to_ne_bytes());
        buf[4..8].copy_from_slice(&rid.slot_no.to_ne_bytes());
    }

    /// Smallest `i` in `[0, num_key)` with `key[i] >= target`, or `num_key`
    /// if no such entry exists. A real binary search over the sorted key
    /// array -- earlier code here claimed this but fell through to a
    /// linear scan in both branches.
    pub fn lower_bound(&self, target: &[u8]) -> usize {
        let (mut lo, mut hi) = (0usize, self.num_key());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.col_type().compare(&self.key_at(mid), target) == std::cmp::Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Smallest `i >= 1` with `key[i] > target`, or `num_key` if none. The
    /// domain starts at 1 on internal nodes because `key[0]` there is a
    /// sentinel copied from the leftmost descendant and is never itself a
    /// separator to search past; leaves have no such sentinel so the
    /// domain starts at 0.
    pub fn upper_bound(&self, target: &[u8]) -> usize {
        let lo0 = if self.is_leaf() { 0 } else { 1 };
        let (mut lo, mut hi) = (lo0, self.num_key());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.col_type().compare(&self.key_at(mid), target) == std::cmp::Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Leaf point lookup: `Some(rid)` if `target` is present.
    pub fn leaf_lookup(&self, target: &[u8]) -> Option<Rid> {
        let i = self.lower_bound(target);
        if i < self.num_key() && self.col_type().compare(&self.key_at(i), target) == std::cmp::Ordering::Equal {
            Some(self.rid_at(i))
        } else {
            None
        }
    }

    /// Internal routing lookup: the child subtree that may contain `target`.
    pub fn internal_lookup(&self, target: &[u8]) -> PageNo {
        let i = self.lower_bound(target);
        if i < self.num_key() && self.col_type().compare(&self.key_at(i), target) == std::cmp::Ordering::Equal {
            self.rid_at(i).page_no
        } else if i == 0 {
            self.rid_at(0).page_no
        } else {
            self.rid_at(i - 1).page_no
        }
    }

    /// Inserts `n` key/rid pairs at `pos`, shifting existing entries right.
    /// Adjacent repeated keys within the input are collapsed to their last
    /// occurrence, mirroring how a batch move during a split can carry a
    /// duplicate boundary key.
    pub fn insert_pairs(&self, pos: usize, keys: &[Vec<u8>], rids: &[Rid]) {
        debug_assert_eq!(keys.len(), rids.len());
        let mut dedup_keys: Vec<Vec<u8>> = Vec::with_capacity(keys.len());
        let mut dedup_rids: Vec<Rid> = Vec::with_capacity(rids.len());
        for (k, r) in keys.iter().zip(rids.iter()) {
            if let Some(last) = dedup_keys.last() {
                if self.col_type().compare(last, k) == std::cmp::Ordering::Equal {
                    let last_idx = dedup_keys.len() - 1;
                    dedup_keys[last_idx] = k.clone();
                    dedup_rids[last_idx] = *r;
                    continue;
                }
            }
            dedup_keys.push(k.clone());
            dedup_rids.push(*r);
        }
        let n = dedup_keys.len();
        let num_key = self.num_key();

        for i in (pos..num_key).rev() {
            let k = self.key_at(i);
            let r = self.rid_at(i);
            self.set_key_raw(i + n, &k);
            self.set_rid_raw(i + n, r);
        }
        for (offset, (k, r)) in dedup_keys.iter().zip(dedup_rids.iter()).enumerate() {
            self.set_key_raw(pos + offset, k);
            self.set_rid_raw(pos + offset, *r);
        }
        self.set_num_key(num_key + n);
    }

    /// Inserts a single key/rid pair, rejecting it (returning the
    /// unchanged size) if the key is already present.
    pub fn insert(&self, key: &[u8], rid: Rid) -> usize {
        let pos = self.lower_bound(key);
        if pos < self.num_key() && self.col_type().compare(&self.key_at(pos), key) == std::cmp::Ordering::Equal {
            return self.num_key();
        }
        self.insert_pairs(pos, std::slice::from_ref(&key.to_vec()), std::slice::from_ref(&rid));
        self.num_key()
    }

    pub fn erase(&self, pos: usize) {
        let num_key = self.num_key();
        for i in pos + 1..num_key {
            let k = self.key_at(i);
            let r = self.rid_at(i);
            self.set_key_raw(i - 1, &k);
            self.set_rid_raw(i - 1, r);
        }
        self.set_num_key(num_key - 1);
    }

    /// Index of `child` among this internal node's children. Asserts a
    /// match is found -- every live child page must appear in its
    /// parent's rid array.
    pub fn find_child(&self, child: PageNo) -> usize {
        for i in 0..self.num_key() {
            if self.rid_at(i).page_no == child {
                return i;
            }
        }
        panic!("child page {} not found among its claimed parent's entries", child);
    }

    pub fn all_entries(&self) -> (Vec<Vec<u8>>, Vec<Rid>) {
        let n = self.num_key();
        let keys = (0..n).map(|i| self.key_at(i)).collect();
        let rids = (0..n).map(|i| self.rid_at(i)).collect();
        (keys, rids)
    }

    /// Removes and returns the entries in `[start, end)`, compacting the
    /// remaining entries down.
    pub fn take_range(&self, start: usize, end: usize) -> (Vec<Vec<u8>>, Vec<Rid>) {
        let keys: Vec<Vec<u8>> = (start..end).map(|i| self.key_at(i)).collect();
        let rids: Vec<Rid> = (start..end).map(|i| self.rid_at(i)).collect();
        let num_key = self.num_key();
        for i in end..num_key {
            let k = self.key_at(i);
            let r = self.rid_at(i);
            self.set_key_raw(i - (end - start), &k);
            self.set_rid_raw(i - (end - start), r);
        }
        self.set_num_key(num_key - (end - start));
        (keys, rids)
    }

    pub fn take_first(&self) -> (Vec<u8>, Rid) {
        let (mut keys, mut rids) = self.take_range(0, 1);
        (keys.remove(0), rids.remove(0))
    }

    pub fn take_last(&self) -> (Vec<u8>, Rid) {
        let n = self.num_key();
        let (mut keys, mut rids) = self.take_range(n - 1, n);
        (keys.remove(0), rids.remove(0))
    }
}

pub fn reset_new_node(node: &IxNodeHandle, is_leaf: bool) {
    node.set_is_leaf(is_leaf);
    node.set_num_key(0);
    node.set_parent(INVALID_PAGE_NO);
    node.set_prev_leaf(INVALID_PAGE_NO);
    node.set_next_leaf(INVALID_PAGE_NO);
    node.set_next_free_page_no(INVALID_PAGE_NO);
}
