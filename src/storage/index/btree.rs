use std::sync::{Arc, Mutex};

use tracing::instrument;

use crate::buffer::BufferPoolManager;
use crate::common::config::{Iid, PageId, PageNo, Rid, INVALID_PAGE_NO};
use crate::common::error::{DbError, DbResult};
use crate::storage::index::file_header::{ColType, IndexFileHeader, HEADER_SIZE};
use crate::storage::index::node::{reset_new_node, IxNodeHandle};

/// A clustered B+-tree index file.
///
/// All structural mutation (`insert`/`delete`) and lookups serialize on a
/// single tree-wide latch, matching the one-big-lock discipline the
/// buffer pool itself uses per page table operation -- this tree never
/// holds more than one node pinned across a blocking call, so the latch
/// never nests under a page pin held by the caller.
pub struct IxIndexHandle {
    fd: i32,
    bpm: Arc<BufferPoolManager>,
    file_hdr: Mutex<IndexFileHeader>,
    root_latch: Mutex<()>,
}

impl IxIndexHandle {
    pub fn create<P: AsRef<std::path::Path>>(
        bpm: Arc<BufferPoolManager>,
        path: P,
        col_type: ColType,
        col_len: u32,
    ) -> DbResult<Self> {
        Self::create_with_order(bpm, path, col_type, col_len, IndexFileHeader::new(col_type, col_len).btree_order)
    }

    /// Like `create`, but with an explicit `btree_order` rather than the
    /// largest one that fits a page. Exists mainly so tests can force
    /// splits/coalesces with a handful of keys instead of the hundreds a
    /// page-filling order would need.
    pub fn create_with_order<P: AsRef<std::path::Path>>(
        bpm: Arc<BufferPoolManager>,
        path: P,
        col_type: ColType,
        col_len: u32,
        btree_order: u32,
    ) -> DbResult<Self> {
        let fd = bpm.open_file(path)?;
        let mut header = IndexFileHeader::new(col_type, col_len);
        header.btree_order = btree_order;
        let header_page = bpm
            .new_page(fd)
            .ok_or(DbError::PageNotExist { fd, page_no: 0 })?;
        header_page.get_data_mut()[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        bpm.unpin_page(header_page.get_page_id().unwrap(), true);
        bpm.flush_page(header_page.get_page_id().unwrap());

        Ok(Self {
            fd,
            bpm,
            file_hdr: Mutex::new(header),
            root_latch: Mutex::new(()),
        })
    }

    pub fn open<P: AsRef<std::path::Path>>(bpm: Arc<BufferPoolManager>, path: P) -> DbResult<Self> {
        let fd = bpm.open_file(path)?;
        let header_page = bpm
            .fetch_page(PageId::new(fd, 0))
            .ok_or(DbError::PageNotExist { fd, page_no: 0 })?;
        let header = IndexFileHeader::from_bytes(&header_page.get_data()[0..HEADER_SIZE]);
        bpm.unpin_page(header_page.get_page_id().unwrap(), false);
        bpm.set_fd2pageno(fd, header.num_pages as PageNo)?;

        Ok(Self {
            fd,
            bpm,
            file_hdr: Mutex::new(header),
            root_latch: Mutex::new(()),
        })
    }

    fn col_type(&self) -> ColType {
        self.file_hdr.lock().unwrap().col_type
    }

    /// True if the tree has no root at all -- the state `AdjustRoot`
    /// leaves it in once the last entry is deleted.
    pub fn is_empty(&self) -> bool {
        self.file_hdr.lock().unwrap().root_page == INVALID_PAGE_NO
    }

    fn min_size(&self, max_size: usize) -> usize {
        (max_size + 1) / 2
    }

    fn fetch_node(&self, page_no: PageNo) -> DbResult<IxNodeHandle> {
        let page = self
            .bpm
            .fetch_page(PageId::new(self.fd, page_no))
            .ok_or(DbError::PageNotExist { fd: self.fd, page_no })?;
        let header = *self.file_hdr.lock().unwrap();
        Ok(IxNodeHandle::new(page, header))
    }

    fn unpin_node(&self, node: &IxNodeHandle, dirty: bool) {
        self.bpm.unpin_page(PageId::new(self.fd, node.page_no()), dirty);
    }

    /// Allocates a fresh node page. The header's page count is bumped only
    /// after `new_page` has actually succeeded, so a failed allocation
    /// never leaves `num_pages` ahead of the pages that truly exist.
    fn create_node(&self, is_leaf: bool) -> DbResult<IxNodeHandle> {
        let page = self
            .bpm
            .new_page(self.fd)
            .ok_or(DbError::PageNotExist { fd: self.fd, page_no: -1 })?;
        let mut hdr = self.file_hdr.lock().unwrap();
        hdr.num_pages += 1;
        let node = IxNodeHandle::new(page, *hdr);
        reset_new_node(&node, is_leaf);
        Ok(node)
    }

    fn ensure_root(&self) -> DbResult<()> {
        let root_page = self.file_hdr.lock().unwrap().root_page;
        if root_page == INVALID_PAGE_NO {
            let leaf = self.create_node(true)?;
            let page_no = leaf.page_no();
            {
                let mut hdr = self.file_hdr.lock().unwrap();
                hdr.root_page = page_no;
                hdr.first_leaf = page_no;
                hdr.last_leaf = page_no;
            }
            self.unpin_node(&leaf, true);
        }
        Ok(())
    }

    fn find_leaf(&self, key: &[u8]) -> DbResult<Option<IxNodeHandle>> {
        let root_page = self.file_hdr.lock().unwrap().root_page;
        if root_page == INVALID_PAGE_NO {
            return Ok(None);
        }
        let mut node = self.fetch_node(root_page)?;
        while !node.is_leaf() {
            let child_no = node.internal_lookup(key);
            let child = self.fetch_node(child_no)?;
            self.unpin_node(&node, false);
            node = child;
        }
        Ok(Some(node))
    }

    /// Looks up `key`, returning its row identifier if present.
    #[instrument(skip(self, key))]
    pub fn get_value(&self, key: &[u8]) -> DbResult<Option<Rid>> {
        let _guard = self.root_latch.lock().unwrap();
        match self.find_leaf(key)? {
            None => Ok(None),
            Some(leaf) => {
                let result = leaf.leaf_lookup(key);
                self.unpin_node(&leaf, false);
                Ok(result)
            }
        }
    }

    /// Inserts `key -> rid`. Returns `false` without error if `key` is
    /// already present -- duplicate keys are rejected, not an exception.
    #[instrument(skip(self, key))]
    pub fn insert(&self, key: &[u8], rid: Rid) -> DbResult<bool> {
        let _guard = self.root_latch.lock().unwrap();
        self.ensure_root()?;
        let leaf = self.find_leaf(key)?.expect("root was just ensured to exist");

        let pos = leaf.lower_bound(key);
        if pos < leaf.num_key() && self.col_type().compare(&leaf.key_at(pos), key) == std::cmp::Ordering::Equal {
            self.unpin_node(&leaf, false);
            return Ok(false);
        }
        leaf.insert_pairs(pos, std::slice::from_ref(&key.to_vec()), std::slice::from_ref(&rid));
        if pos == 0 {
            self.maintain_parent(&leaf)?;
        }

        if leaf.num_key() == leaf.max_size() - 1 {
            let new_leaf = self.split(&leaf)?;
            let pivot = new_leaf.key_at(0);
            self.insert_into_parent(&leaf, &pivot, &new_leaf)?;
            self.unpin_node(&new_leaf, true);
        }
        self.unpin_node(&leaf, true);
        Ok(true)
    }

    /// Deletes `key`. Returns `false` without error if it was not present.
    #[instrument(skip(self, key))]
    pub fn delete(&self, key: &[u8]) -> DbResult<bool> {
        let _guard = self.root_latch.lock().unwrap();
        let leaf = match self.find_leaf(key)? {
            None => return Ok(false),
            Some(l) => l,
        };
        let pos = leaf.lower_bound(key);
        if pos >= leaf.num_key() || self.col_type().compare(&leaf.key_at(pos), key) != std::cmp::Ordering::Equal {
            self.unpin_node(&leaf, false);
            return Ok(false);
        }
        leaf.erase(pos);

        let is_root = leaf.parent() == INVALID_PAGE_NO;
        let needs_fixup = is_root || self.is_underflow(&leaf);
        if needs_fixup {
            let released = self.coalesce_or_redistribute(&leaf)?;
            if !released {
                if pos == 0 {
                    self.maintain_parent(&leaf)?;
                }
                self.unpin_node(&leaf, true);
            }
        } else {
            if pos == 0 {
                self.maintain_parent(&leaf)?;
            }
            self.unpin_node(&leaf, true);
        }
        Ok(true)
    }

    fn is_underflow(&self, node: &IxNodeHandle) -> bool {
        if node.parent() == INVALID_PAGE_NO {
            return false;
        }
        let min_size = self.min_size(node.max_size());
        if node.is_leaf() {
            node.num_key() + 1 < min_size
        } else {
            node.num_key() < min_size
        }
    }

    fn split(&self, node: &IxNodeHandle) -> DbResult<IxNodeHandle> {
        let is_leaf = node.is_leaf();
        let new_node = self.create_node(is_leaf)?;
        let max_size = node.max_size();
        let split_pos = if is_leaf {
            (max_size - 1) / 2
        } else {
            self.min_size(max_size)
        };
        let num_key = node.num_key();
        let (keys, rids) = node.take_range(split_pos, num_key);
        new_node.insert_pairs(0, &keys, &rids);
        new_node.set_parent(node.parent());

        if is_leaf {
            let old_next = node.next_leaf();
            new_node.set_next_leaf(old_next);
            new_node.set_prev_leaf(node.page_no());
            node.set_next_leaf(new_node.page_no());
            if old_next != INVALID_PAGE_NO {
                let next_node = self.fetch_node(old_next)?;
                next_node.set_prev_leaf(new_node.page_no());
                self.unpin_node(&next_node, true);
            } else {
                self.file_hdr.lock().unwrap().last_leaf = new_node.page_no();
            }
        } else {
            for i in 0..new_node.num_key() {
                let child_no = new_node.rid_at(i).page_no;
                let child = self.fetch_node(child_no)?;
                child.set_parent(new_node.page_no());
                self.unpin_node(&child, true);
            }
        }
        Ok(new_node)
    }

    fn insert_into_parent(&self, old: &IxNodeHandle, pivot_key: &[u8], new_node: &IxNodeHandle) -> DbResult<()> {
        if old.parent() == INVALID_PAGE_NO {
            let new_root = self.create_node(false)?;
            let old_min = old.key_at(0);
            new_root.insert_pairs(
                0,
                &[old_min, pivot_key.to_vec()],
                &[Rid::new(old.page_no(), 0), Rid::new(new_node.page_no(), 0)],
            );
            old.set_parent(new_root.page_no());
            new_node.set_parent(new_root.page_no());
            self.file_hdr.lock().unwrap().root_page = new_root.page_no();
            self.unpin_node(&new_root, true);
            return Ok(());
        }

        let parent = self.fetch_node(old.parent())?;
        let idx = parent.find_child(old.page_no());
        parent.insert_pairs(
            idx + 1,
            std::slice::from_ref(&pivot_key.to_vec()),
            std::slice::from_ref(&Rid::new(new_node.page_no(), 0)),
        );

        if parent.num_key() == parent.max_size() {
            let new_sibling = self.split(&parent)?;
            let pivot = new_sibling.key_at(0);
            self.insert_into_parent(&parent, &pivot, &new_sibling)?;
            self.unpin_node(&new_sibling, true);
        }
        self.unpin_node(&parent, true);
        Ok(())
    }

    /// Walks upward from `node`, updating each ancestor's separator to
    /// match its child's current first key, stopping as soon as an
    /// ancestor's separator is already correct.
    ///
    /// This only compares keys, never sizes, on the way up. A coalesce
    /// that merges a node into its left sibling and then triggers a
    /// recursive parent underflow is handled by `coalesce_or_redistribute`
    /// recursing on the parent directly rather than by this walk noticing
    /// a size change, so the key-only comparison here is sufficient: by
    /// the time `maintain_parent` runs, no further size-driven restructuring
    /// is pending on the path it walks.
    fn maintain_parent(&self, node: &IxNodeHandle) -> DbResult<()> {
        let mut child_page_no = node.page_no();
        let mut child_first_key = node.key_at(0);
        let mut parent_no = node.parent();
        while parent_no != INVALID_PAGE_NO {
            let parent = self.fetch_node(parent_no)?;
            let idx = parent.find_child(child_page_no);
            if self.col_type().compare(&parent.key_at(idx), &child_first_key) == std::cmp::Ordering::Equal {
                self.unpin_node(&parent, false);
                break;
            }
            parent.set_key_at(idx, child_first_key.clone());
            child_page_no = parent.page_no();
            child_first_key = parent.key_at(0);
            let next_parent_no = parent.parent();
            self.unpin_node(&parent, true);
            parent_no = next_parent_no;
        }
        Ok(())
    }

    /// Resolves an underflowing `node`. Returns whether `node` itself was
    /// consumed (merged away or demoted as the old root) -- if so the
    /// caller must not touch or unpin it again, since its page has already
    /// been released.
    fn coalesce_or_redistribute(&self, node: &IxNodeHandle) -> DbResult<bool> {
        if node.parent() == INVALID_PAGE_NO {
            let released = (node.is_leaf() && node.num_key() == 0) || (!node.is_leaf() && node.num_key() == 1);
            self.adjust_root(node)?;
            return Ok(released);
        }

        let parent = self.fetch_node(node.parent())?;
        let idx = parent.find_child(node.page_no());
        let (sibling_no, sibling_is_left) = if idx > 0 {
            (parent.rid_at(idx - 1).page_no, true)
        } else {
            (parent.rid_at(idx + 1).page_no, false)
        };
        let sibling = self.fetch_node(sibling_no)?;
        let min_size = self.min_size(node.max_size());

        if sibling.num_key() > min_size {
            self.redistribute(&sibling, node, &parent, sibling_is_left)?;
            self.unpin_node(&sibling, true);
            self.unpin_node(&parent, true);
            return Ok(false);
        }

        // Express the merge direction as two local bindings, swapped by
        // which side the sibling is on, instead of branching the merge
        // logic itself two ways.
        let (left, right) = if sibling_is_left {
            (sibling.clone_handle(), node.clone_handle())
        } else {
            (node.clone_handle(), sibling.clone_handle())
        };
        self.coalesce(&left, &right, &parent)?;
        if sibling_is_left {
            self.unpin_node(&sibling, true);
        }

        if self.is_underflow(&parent) || parent.parent() == INVALID_PAGE_NO {
            let parent_released = self.coalesce_or_redistribute(&parent)?;
            if !parent_released {
                self.unpin_node(&parent, true);
            }
        } else {
            self.unpin_node(&parent, true);
        }

        Ok(sibling_is_left)
    }

    /// Moves every entry from `right` into `left`, relinks leaf sibling
    /// pointers if applicable, removes `right`'s separator from `parent`,
    /// and releases `right`'s page. Does not touch `parent`'s pin -- the
    /// caller decides whether `parent` now also needs fixing up.
    fn coalesce(&self, left: &IxNodeHandle, right: &IxNodeHandle, parent: &IxNodeHandle) -> DbResult<()> {
        let (keys, rids) = right.all_entries();
        let base = left.num_key();
        left.insert_pairs(base, &keys, &rids);

        if !right.is_leaf() {
            for rid in &rids {
                let child = self.fetch_node(rid.page_no)?;
                child.set_parent(left.page_no());
                self.unpin_node(&child, true);
            }
        }

        if left.is_leaf() {
            let next = right.next_leaf();
            left.set_next_leaf(next);
            if next != INVALID_PAGE_NO {
                let next_node = self.fetch_node(next)?;
                next_node.set_prev_leaf(left.page_no());
                self.unpin_node(&next_node, true);
            } else {
                self.file_hdr.lock().unwrap().last_leaf = left.page_no();
            }
        }

        let idx = parent.find_child(right.page_no());
        parent.erase(idx);

        let right_page_id = PageId::new(self.fd, right.page_no());
        self.bpm.unpin_page(right_page_id, false);
        self.bpm.delete_page(right_page_id);
        Ok(())
    }

    /// Moves one entry from `sibling` into `node`, keeping `parent`'s
    /// separator for the shrunk side in sync.
    fn redistribute(&self, sibling: &IxNodeHandle, node: &IxNodeHandle, parent: &IxNodeHandle, sibling_is_left: bool) -> DbResult<()> {
        let idx = parent.find_child(node.page_no());
        if !sibling_is_left {
            let (k, r) = sibling.take_first();
            node.insert_pairs(node.num_key(), std::slice::from_ref(&k), std::slice::from_ref(&r));
            if !node.is_leaf() {
                let child = self.fetch_node(r.page_no)?;
                child.set_parent(node.page_no());
                self.unpin_node(&child, true);
            }
            parent.set_key_at(idx + 1, sibling.key_at(0));
        } else {
            let (k, r) = sibling.take_last();
            node.insert_pairs(0, std::slice::from_ref(&k), std::slice::from_ref(&r));
            if !node.is_leaf() {
                let child = self.fetch_node(r.page_no)?;
                child.set_parent(node.page_no());
                self.unpin_node(&child, true);
            }
            parent.set_key_at(idx, node.key_at(0));
        }
        Ok(())
    }

    /// Collapses a root that has shrunk to the point of redundancy: an
    /// internal root with one remaining child is replaced by that child,
    /// and a leaf root with zero entries invalidates the whole tree.
    /// Does nothing (leaving `root` pinned for the caller) in every other
    /// case.
    fn adjust_root(&self, root: &IxNodeHandle) -> DbResult<()> {
        if !root.is_leaf() && root.num_key() == 1 {
            let only_child_no = root.rid_at(0).page_no;
            let child = self.fetch_node(only_child_no)?;
            child.set_parent(INVALID_PAGE_NO);
            self.unpin_node(&child, true);
            self.file_hdr.lock().unwrap().root_page = only_child_no;

            let root_page_id = PageId::new(self.fd, root.page_no());
            self.bpm.unpin_page(root_page_id, false);
            self.bpm.delete_page(root_page_id);
        } else if root.is_leaf() && root.num_key() == 0 {
            let root_page_id = PageId::new(self.fd, root.page_no());
            self.bpm.unpin_page(root_page_id, false);
            self.bpm.delete_page(root_page_id);

            let mut hdr = self.file_hdr.lock().unwrap();
            hdr.root_page = INVALID_PAGE_NO;
            hdr.first_leaf = INVALID_PAGE_NO;
            hdr.last_leaf = INVALID_PAGE_NO;
        }
        Ok(())
    }

    /// First position at or after which `key` would sort, as an `Iid`
    /// usable with `get_rid`/`scan`.
    pub fn lower_bound_iid(&self, key: &[u8]) -> DbResult<Iid> {
        let _guard = self.root_latch.lock().unwrap();
        self.bound_iid(key, false)
    }

    /// First position strictly after every occurrence of `key`.
    pub fn upper_bound_iid(&self, key: &[u8]) -> DbResult<Iid> {
        let _guard = self.root_latch.lock().unwrap();
        self.bound_iid(key, true)
    }

    fn bound_iid(&self, key: &[u8], upper: bool) -> DbResult<Iid> {
        match self.find_leaf(key)? {
            None => Ok(Iid::new(INVALID_PAGE_NO, 0)),
            Some(leaf) => {
                let pos = if upper { leaf.upper_bound(key) } else { leaf.lower_bound(key) };
                let iid = if pos < leaf.num_key() {
                    Iid::new(leaf.page_no(), pos as i32)
                } else {
                    let next = leaf.next_leaf();
                    if next == INVALID_PAGE_NO {
                        Iid::new(INVALID_PAGE_NO, 0)
                    } else {
                        Iid::new(next, 0)
                    }
                };
                self.unpin_node(&leaf, false);
                Ok(iid)
            }
        }
    }

    pub fn leaf_begin(&self) -> Iid {
        Iid::new(self.file_hdr.lock().unwrap().first_leaf, 0)
    }

    pub fn leaf_end(&self) -> Iid {
        Iid::new(INVALID_PAGE_NO, 0)
    }

    /// Dereferences an `Iid` to the row identifier it names.
    pub fn get_rid(&self, iid: Iid) -> DbResult<Rid> {
        if iid.page_no == INVALID_PAGE_NO {
            return Err(DbError::IndexEntryNotFound);
        }
        let node = self.fetch_node(iid.page_no)?;
        if iid.slot_no as usize >= node.num_key() {
            self.unpin_node(&node, false);
            return Err(DbError::IndexEntryNotFound);
        }
        let rid = node.rid_at(iid.slot_no as usize);
        self.unpin_node(&node, false);
        Ok(rid)
    }

    /// Collects every key/rid pair in `[lower, upper)`, walking the leaf
    /// chain across page boundaries. Eager rather than lazy: a streaming
    /// iterator would have to keep a leaf pinned across calls the caller
    /// controls the pacing of, which the pin-discipline contract here
    /// does not allow.
    pub fn scan(&self, lower: Iid, upper: Iid) -> DbResult<Vec<(Vec<u8>, Rid)>> {
        let _guard = self.root_latch.lock().unwrap();
        let mut out = Vec::new();
        if lower.page_no == INVALID_PAGE_NO {
            return Ok(out);
        }
        let mut cur = lower;
        loop {
            if cur.page_no == INVALID_PAGE_NO || cur == upper {
                break;
            }
            let node = self.fetch_node(cur.page_no)?;
            let slot = cur.slot_no as usize;
            if slot >= node.num_key() {
                let next = node.next_leaf();
                self.unpin_node(&node, false);
                if next == INVALID_PAGE_NO {
                    break;
                }
                cur = Iid::new(next, 0);
                continue;
            }
            out.push((node.key_at(slot), node.rid_at(slot)));
            let next_cur = if slot + 1 < node.num_key() {
                Iid::new(cur.page_no, slot as i32 + 1)
            } else {
                Iid::new(node.next_leaf(), 0)
            };
            self.unpin_node(&node, false);
            cur = next_cur;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;
    use tempdir::TempDir;

    use super::*;
    use crate::storage::disk::DiskManager;

    fn setup(order: u32) -> (Arc<BufferPoolManager>, IxIndexHandle, TempDir) {
        let dir = TempDir::new("test").unwrap();
        let bpm = Arc::new(BufferPoolManager::new(128, DiskManager::new()));
        let index = IxIndexHandle::create_with_order(bpm.clone(), dir.path().join("t.idx"), ColType::Int32, 4, order).unwrap();
        (bpm, index, dir)
    }

    fn key(n: i32) -> Vec<u8> {
        n.to_ne_bytes().to_vec()
    }

    impl IxIndexHandle {
        /// Recursively validates invariant 4 (ascending keys, first-key
        /// invariant) and invariant 5 (min/max size bounds on non-root
        /// nodes) from spec testable property list §8. Returns the
        /// subtree's minimum key.
        fn check_subtree(&self, page_no: PageNo, is_root: bool) -> Vec<u8> {
            let node = self.fetch_node(page_no).unwrap();
            let num_key = node.num_key();
            let max_size = node.max_size();
            let min_size = self.min_size(max_size);

            if !is_root {
                if node.is_leaf() {
                    assert!(num_key + 1 >= min_size, "leaf below min size");
                } else {
                    assert!(num_key >= min_size, "internal node below min size");
                }
            }
            if node.is_leaf() {
                assert!(num_key <= max_size - 1, "leaf at or past split threshold");
            } else {
                assert!(num_key <= max_size, "internal node past max size");
            }

            for i in 1..num_key {
                assert_eq!(
                    self.col_type().compare(&node.key_at(i - 1), &node.key_at(i)),
                    std::cmp::Ordering::Less,
                    "keys not strictly ascending within page {page_no}"
                );
            }

            let min_key = if node.is_leaf() {
                node.key_at(0)
            } else {
                let mut min_key = None;
                for i in 0..num_key {
                    let child_no = node.rid_at(i).page_no;
                    let child = self.fetch_node(child_no).unwrap();
                    assert_eq!(child.parent(), page_no, "child's parent pointer disagrees with its actual parent");
                    self.unpin_node(&child, false);
                    let child_min = self.check_subtree(child_no, false);
                    assert_eq!(
                        self.col_type().compare(&node.key_at(i), &child_min),
                        std::cmp::Ordering::Equal,
                        "first-key invariant violated at page {page_no} entry {i}"
                    );
                    if i == 0 {
                        min_key = Some(child_min);
                    }
                }
                min_key.expect("internal node with no entries")
            };
            self.unpin_node(&node, false);
            min_key
        }

        /// Validates invariant 6: the leaf chain from `first_leaf` to
        /// `last_leaf` is ascending, duplicate-free, and exactly (number of
        /// leaves - 1) hops long, with `prev_leaf`/`next_leaf` symmetric.
        fn check_leaf_chain(&self) -> Vec<i32> {
            let hdr = *self.file_hdr.lock().unwrap();
            let mut keys = Vec::new();
            let mut cur = hdr.first_leaf;
            let mut prev = INVALID_PAGE_NO;
            while cur != INVALID_PAGE_NO {
                let node = self.fetch_node(cur).unwrap();
                assert!(node.is_leaf());
                assert_eq!(node.prev_leaf(), prev, "leaf chain back-pointer mismatch at page {cur}");
                for i in 0..node.num_key() {
                    keys.push(i32::from_ne_bytes(node.key_at(i).try_into().unwrap()));
                }
                prev = cur;
                let next = node.next_leaf();
                if next == INVALID_PAGE_NO {
                    assert_eq!(cur, hdr.last_leaf, "chain did not terminate at last_leaf");
                }
                self.unpin_node(&node, false);
                cur = next;
            }
            for w in keys.windows(2) {
                assert!(w[0] < w[1], "leaf chain keys not strictly ascending: {keys:?}");
            }
            keys
        }

        fn check_invariants(&self) {
            let root_page = self.file_hdr.lock().unwrap().root_page;
            if root_page == INVALID_PAGE_NO {
                assert!(self.is_empty());
                return;
            }
            self.check_subtree(root_page, true);
            self.check_leaf_chain();
        }
    }

    #[test]
    fn s1_splitting_twice_keeps_leaf_iteration_sorted_and_intact() {
        let (_bpm, index, _dir) = setup(4);
        for (i, k) in [10, 20, 30, 40, 50, 60, 70, 80].iter().enumerate() {
            assert!(index.insert(&key(*k), Rid::new(0, i as i32)).unwrap());
        }
        let leaf_page_count = {
            let mut cur = index.file_hdr.lock().unwrap().first_leaf;
            let mut n = 0;
            while cur != INVALID_PAGE_NO {
                let node = index.fetch_node(cur).unwrap();
                let next = node.next_leaf();
                index.unpin_node(&node, false);
                cur = next;
                n += 1;
            }
            n
        };
        assert!(leaf_page_count >= 3, "expected at least two splits, got {leaf_page_count} leaves");
        index.check_invariants();
        assert_eq!(index.check_leaf_chain(), vec![10, 20, 30, 40, 50, 60, 70, 80]);
    }

    #[test]
    fn s2_deleting_a_run_triggers_rebalance_and_preserves_invariants() {
        let (_bpm, index, _dir) = setup(4);
        for (i, k) in [10, 20, 30, 40, 50, 60, 70, 80].iter().enumerate() {
            index.insert(&key(*k), Rid::new(0, i as i32)).unwrap();
        }
        for k in [40, 50, 60] {
            assert!(index.delete(&key(k)).unwrap());
        }
        index.check_invariants();
        assert_eq!(index.check_leaf_chain(), vec![10, 20, 30, 70, 80]);
    }

    #[test]
    fn s6_deleting_the_sole_leaf_leaves_an_invalid_empty_tree() {
        let (_bpm, index, _dir) = setup(4);
        index.insert(&key(42), Rid::new(0, 0)).unwrap();
        assert!(index.delete(&key(42)).unwrap());
        assert!(index.is_empty());
        let hdr = *index.file_hdr.lock().unwrap();
        assert_eq!(hdr.root_page, INVALID_PAGE_NO);
        assert_eq!(hdr.first_leaf, INVALID_PAGE_NO);
        assert_eq!(hdr.last_leaf, INVALID_PAGE_NO);
    }

    #[test]
    fn property_random_permutation_insert_then_delete_all_preserves_invariants_throughout() {
        let mut rng = rand::thread_rng();
        let (_bpm, index, _dir) = setup(4);
        let mut keys: Vec<i32> = (0..60).collect();
        keys.shuffle(&mut rng);

        for (i, k) in keys.iter().enumerate() {
            assert!(index.insert(&key(*k), Rid::new(0, i as i32)).unwrap());
            index.check_invariants();
        }
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(index.check_leaf_chain(), sorted);

        let mut delete_order = keys.clone();
        delete_order.shuffle(&mut rng);
        for k in &delete_order {
            assert!(index.delete(&key(*k)).unwrap());
            index.check_invariants();
        }
        assert!(index.is_empty());
        assert_eq!(index.file_hdr.lock().unwrap().root_page, INVALID_PAGE_NO);
    }
}
