use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::oneshot;

use crate::common::config::PageId;
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;

/// Represents a Read or Write request for the DiskManager to execute.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        /// The page being read into from disk.
        page: Page,
        /// Signaled once the request has been completed.
        callback: oneshot::Sender<()>,
    },
    Write {
        page_id: PageId,
        /// The page being written out to disk.
        page: Page,
        /// Signaled once the request has been completed.
        callback: oneshot::Sender<()>,
    },
}

/// The DiskScheduler schedules disk read and write operations.
///
/// A request is scheduled by calling `DiskScheduler::schedule()` with an
/// appropriate `DiskRequest`. The scheduler maintains a background worker
/// thread that processes scheduled requests using the disk manager. The
/// background thread is created in the constructor and joined in `Drop`.
///
/// This gives the buffer pool a single chokepoint for page I/O across every
/// file the disk manager has open, instead of calling the disk manager
/// inline from whichever thread happens to be evicting or faulting in a
/// page.
pub struct DiskScheduler {
    /// Sending `None` signals the background thread to stop.
    request_queue: crossbeam::channel::Sender<Option<DiskRequest>>,
    background_thread: Option<thread::JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<Mutex<DiskManager>>) -> Self {
        let (tx, rx) = crossbeam::channel::unbounded();
        Self {
            request_queue: tx,
            background_thread: Some(thread::spawn(move || {
                Self::start_worker_thread(rx, disk_manager)
            })),
        }
    }

    /// Schedules a request for the DiskManager to execute.
    pub fn schedule(&self, r: DiskRequest) {
        self.request_queue.send(Some(r)).unwrap();
    }

    fn start_worker_thread(
        rx: crossbeam::channel::Receiver<Option<DiskRequest>>,
        disk_manager: Arc<Mutex<DiskManager>>,
    ) {
        while let Ok(r) = rx.recv() {
            match r {
                Some(DiskRequest::Read { page_id, page, callback }) => {
                    disk_manager
                        .lock()
                        .unwrap()
                        .read_page(page_id.fd, page_id.page_no, &mut *page.get_data_mut())
                        .expect("disk read failed");
                    let _ = callback.send(());
                }
                Some(DiskRequest::Write { page_id, page, callback }) => {
                    disk_manager
                        .lock()
                        .unwrap()
                        .write_page(page_id.fd, page_id.page_no, &*page.get_data())
                        .expect("disk write failed");
                    let _ = callback.send(());
                }
                None => break,
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        let _ = self.request_queue.send(None);
        if let Some(handle) = self.background_thread.take() {
            let _ = handle.join();
        }
    }
}
