use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::instrument;

use super::replacer::LruReplacer;
use crate::common::config::{Fd, FrameId, PageId, PageNo};
use crate::storage::disk::{DiskManager, DiskRequest, DiskScheduler};
use crate::storage::page::Page;

/// BufferPoolManager reads disk pages into and out of its internal pool of
/// in-memory frames, hiding paging from every component built on top of it
/// (the record file handle, the B+-tree node/index handles).
///
/// Every public operation here pins at most one page and unpins on every
/// exit path that doesn't itself pin it for the caller -- `fetch_page` and
/// `new_page` return a pinned page the caller is responsible for unpinning;
/// every other operation here neither pins nor leaves a page pinned longer
/// than its own body.
pub struct BufferPoolManager {
    pool_size: usize,
    pages: Vec<Page>,
    disk_manager: Arc<Mutex<DiskManager>>,
    disk_scheduler: DiskScheduler,
    /// Maps a resident page id to the frame holding it.
    page_table: Mutex<HashMap<PageId, FrameId>>,
    replacer: Mutex<LruReplacer>,
    free_list: Mutex<Vec<FrameId>>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        let disk_manager = Arc::new(Mutex::new(disk_manager));
        let free_list = (0..pool_size as FrameId).rev().collect();
        Self {
            pool_size,
            pages: (0..pool_size).map(|_| Page::new()).collect(),
            disk_scheduler: DiskScheduler::new(disk_manager.clone()),
            disk_manager,
            page_table: Mutex::new(HashMap::new()),
            replacer: Mutex::new(LruReplacer::new()),
            free_list: Mutex::new(free_list),
        }
    }

    pub fn get_pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn get_pages(&self) -> &Vec<Page> {
        &self.pages
    }

    /// Registers a new file with the underlying disk manager, returning the
    /// `fd` future page ids for it should use.
    pub fn open_file<P: AsRef<std::path::Path>>(&self, path: P) -> crate::common::DbResult<Fd> {
        self.disk_manager.lock().unwrap().open_file(path)
    }

    /// Finds a frame to place a page into, picking from the free list first
    /// and falling back to evicting an unpinned frame from the replacer.
    /// Writes back a dirty victim before reusing its frame. Returns `None`
    /// if every frame is pinned.
    fn find_victim_frame(&self) -> Option<FrameId> {
        if let Some(frame_id) = self.free_list.lock().unwrap().pop() {
            return Some(frame_id);
        }
        let frame_id = self.replacer.lock().unwrap().victim()?;
        let page = &self.pages[frame_id as usize];
        if page.is_dirty() {
            let (tx, rx) = oneshot::channel();
            self.disk_scheduler.schedule(DiskRequest::Write {
                page_id: page.get_page_id().unwrap(),
                page: page.clone(),
                callback: tx,
            });
            rx.blocking_recv().unwrap();
        }
        self.page_table
            .lock()
            .unwrap()
            .remove(&page.get_page_id().unwrap());
        Some(frame_id)
    }

    /// Creates a new page in `fd` and pins it in the buffer pool. Returns
    /// `None` if every frame is currently pinned.
    #[instrument(skip(self))]
    pub fn new_page(&self, fd: Fd) -> Option<Page> {
        let frame_id = self.find_victim_frame()?;
        let page_no = self.disk_manager.lock().unwrap().allocate_page(fd).ok()?;
        let page_id = PageId::new(fd, page_no);

        let page = &self.pages[frame_id as usize];
        page.reset();
        page.set_page_id(page_id);
        page.pin();
        self.page_table.lock().unwrap().insert(page_id, frame_id);
        self.replacer.lock().unwrap().pin(frame_id);

        Some(page.clone())
    }

    /// Fetches `page_id` into the buffer pool, pinning it. Returns `None`
    /// if the page needs to be read from disk but every frame is pinned.
    #[instrument(skip(self))]
    pub fn fetch_page(&self, page_id: PageId) -> Option<Page> {
        if let Some(frame_id) = self.page_table.lock().unwrap().get(&page_id) {
            let page = &self.pages[*frame_id as usize];
            page.pin();
            self.replacer.lock().unwrap().pin(*frame_id);
            return Some(page.clone());
        }

        let frame_id = self.find_victim_frame()?;
        let page = &self.pages[frame_id as usize];
        page.set_page_id(page_id);

        let (tx, rx) = oneshot::channel();
        self.disk_scheduler.schedule(DiskRequest::Read {
            page_id,
            page: page.clone(),
            callback: tx,
        });
        rx.blocking_recv().unwrap();

        page.pin();
        page.set_dirty(false);
        self.page_table.lock().unwrap().insert(page_id, frame_id);
        self.replacer.lock().unwrap().pin(frame_id);

        Some(page.clone())
    }

    /// Decrements the pin count of `page_id`. If it drops to zero, the
    /// frame becomes a candidate for eviction. Returns `false` -- a
    /// programmer-bug signal, not an error -- if `page_id` isn't resident
    /// or its pin count was already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let frame_id = match self.page_table.lock().unwrap().get(&page_id).copied() {
            Some(f) => f,
            None => return false,
        };
        let page = &self.pages[frame_id as usize];
        if page.get_pin_count() <= 0 {
            return false;
        }
        if is_dirty {
            page.set_dirty(true);
        }
        page.unpin();
        if page.get_pin_count() == 0 {
            self.replacer.lock().unwrap().unpin(frame_id);
        }
        true
    }

    /// Flushes `page_id` to disk regardless of its dirty flag, clearing the
    /// flag afterward. Returns `false` if the page isn't resident.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let frame_id = match self.page_table.lock().unwrap().get(&page_id).copied() {
            Some(f) => f,
            None => return false,
        };
        let page = &self.pages[frame_id as usize];
        let (tx, rx) = oneshot::channel();
        self.disk_scheduler.schedule(DiskRequest::Write {
            page_id,
            page: page.clone(),
            callback: tx,
        });
        rx.blocking_recv().unwrap();
        page.set_dirty(false);
        true
    }

    /// Flushes every resident page belonging to `fd` to disk, clearing
    /// their dirty flags.
    pub fn flush_all_pages(&self, fd: Fd) {
        let page_ids: Vec<PageId> = self
            .page_table
            .lock()
            .unwrap()
            .keys()
            .copied()
            .filter(|p| p.fd == fd)
            .collect();
        for page_id in page_ids {
            self.flush_page(page_id);
        }
    }

    /// Removes `page_id` from the buffer pool. Returns `false` if the page
    /// is pinned and can't be deleted; returns `true` (a no-op) if the page
    /// wasn't resident at all.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let frame_id = match self.page_table.lock().unwrap().get(&page_id).copied() {
            Some(f) => f,
            None => return true,
        };
        let page = &self.pages[frame_id as usize];
        if page.get_pin_count() > 0 {
            return false;
        }
        self.page_table.lock().unwrap().remove(&page_id);
        self.replacer.lock().unwrap().remove(frame_id);
        self.free_list.lock().unwrap().push(frame_id);
        page.reset();
        self.disk_manager
            .lock()
            .unwrap()
            .deallocate_page(page_id.fd, page_id.page_no);
        true
    }

    pub fn get_fd2pageno(&self, fd: Fd) -> crate::common::DbResult<PageNo> {
        self.disk_manager.lock().unwrap().get_fd2pageno(fd)
    }

    pub fn set_fd2pageno(&self, fd: Fd, page_no: PageNo) -> crate::common::DbResult<()> {
        self.disk_manager.lock().unwrap().set_fd2pageno(fd, page_no)
    }
}

#[cfg(test)]
mod tests {
    use rand::distributions::{Distribution, Uniform};
    use tempdir::TempDir;

    use super::*;
    use crate::common::config::PAGE_SIZE;

    fn setup(pool_size: usize) -> (BufferPoolManager, Fd, TempDir) {
        let dir = TempDir::new("test").unwrap();
        let db_name = dir.path().join("test.db");
        let dm = DiskManager::new();
        let bpm = BufferPoolManager::new(pool_size, dm);
        let fd = bpm.open_file(&db_name).unwrap();
        (bpm, fd, dir)
    }

    #[test]
    fn binary_data_roundtrips_through_eviction() {
        let (bpm, fd, _dir) = setup(10);

        let page0 = bpm.new_page(fd);
        assert!(page0.is_some());

        let mut rng = rand::thread_rng();
        let uniform = Uniform::from(std::u8::MIN..=std::u8::MAX);
        let mut random_data: Vec<u8> = (0..PAGE_SIZE).map(|_| uniform.sample(&mut rng)).collect();
        random_data[PAGE_SIZE / 2] = 0;
        random_data[PAGE_SIZE - 1] = 0;

        let page0 = page0.unwrap();
        page0.get_data_mut()[..random_data.len()].copy_from_slice(&random_data);
        assert_eq!(random_data, page0.get_data()[..random_data.len()]);

        for _ in 1..10 {
            assert!(bpm.new_page(fd).is_some());
        }
        for _ in 10..20 {
            assert!(bpm.new_page(fd).is_none());
        }

        for i in 0..5 {
            let page_id = PageId::new(fd, i);
            assert!(bpm.unpin_page(page_id, true));
            bpm.flush_page(page_id);
        }
        for _ in 0..5 {
            let page = bpm.new_page(fd);
            assert!(page.is_some());
            bpm.unpin_page(page.unwrap().get_page_id().unwrap(), false);
        }

        let page0 = bpm.fetch_page(PageId::new(fd, 0));
        assert!(page0.is_some());
        let page0 = page0.unwrap();
        assert_eq!(*page0.get_data(), random_data.as_slice());
        assert!(bpm.unpin_page(PageId::new(fd, 0), true));
    }

    #[test]
    fn pool_exhaustion_and_recovery() {
        let (bpm, fd, _dir) = setup(10);

        let page0 = bpm.new_page(fd);
        assert!(page0.is_some());
        assert_eq!(0, page0.as_ref().unwrap().get_page_id().unwrap().page_no);

        for _ in 1..10 {
            assert!(bpm.new_page(fd).is_some());
        }
        for _ in 10..20 {
            assert!(bpm.new_page(fd).is_none());
        }

        for i in 0..5 {
            assert!(bpm.unpin_page(PageId::new(fd, i), true));
        }
        for _ in 0..4 {
            assert!(bpm.new_page(fd).is_some());
        }

        let page0 = bpm.fetch_page(PageId::new(fd, 0));
        assert!(page0.is_some());

        assert!(bpm.unpin_page(PageId::new(fd, 0), true));
        assert!(bpm.new_page(fd).is_some());
        assert!(bpm.fetch_page(PageId::new(fd, 0)).is_none());
    }

    #[test]
    fn unpin_with_zero_pin_count_returns_false() {
        let (bpm, fd, _dir) = setup(2);
        let page = bpm.new_page(fd).unwrap();
        let page_id = page.get_page_id().unwrap();
        assert!(bpm.unpin_page(page_id, false));
        assert!(!bpm.unpin_page(page_id, false));
    }

    #[test]
    fn delete_page_requires_zero_pins() {
        let (bpm, fd, _dir) = setup(2);
        let page = bpm.new_page(fd).unwrap();
        let page_id = page.get_page_id().unwrap();
        assert!(!bpm.delete_page(page_id));
        assert!(bpm.unpin_page(page_id, false));
        assert!(bpm.delete_page(page_id));
        assert!(bpm.delete_page(page_id));
    }

    /// Property 1: every resident page_id maps to exactly one frame, and
    /// that frame reports the same page_id back.
    #[test]
    fn page_table_and_frames_stay_mutually_consistent_under_churn() {
        let (bpm, fd, _dir) = setup(4);
        for _ in 0..4 {
            let page = bpm.new_page(fd).unwrap();
            bpm.unpin_page(page.get_page_id().unwrap(), false);
        }
        // Fetch a couple of pages back in, forcing eviction of others, then
        // leave the pool in a mixed pinned/unpinned state before checking.
        let refetched = bpm.fetch_page(PageId::new(fd, 0)).unwrap();
        let _ = bpm.new_page(fd); // evicts something, since the pool is full

        let page_table = bpm.page_table.lock().unwrap();
        assert!(page_table.len() <= bpm.get_pool_size());
        for (&page_id, &frame_id) in page_table.iter() {
            let frame = &bpm.pages[frame_id as usize];
            assert_eq!(frame.get_page_id(), Some(page_id), "frame {frame_id} disagrees with the page table about its own identity");
        }
        drop(page_table);
        bpm.unpin_page(refetched.get_page_id().unwrap(), false);
    }
}
