use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};

use crate::common::{DbError, PageData, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// Completion channel carrying the page buffer back to the caller.
type Reply = crossbeam_channel::Sender<Result<Box<PageData>>>;

/// A disk I/O request. The buffer travels with the request, so the worker owns
/// it for the duration of the I/O and hands it back on completion.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        data: Box<PageData>,
        reply: Reply,
    },
    Write {
        page_id: PageId,
        data: Box<PageData>,
        reply: Reply,
    },
}

/// DiskScheduler runs disk I/O on a background worker thread fed through a
/// bounded queue.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    /// `None` once shutdown has begun
    request_sender: Option<Sender<DiskRequest>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(dm_clone, receiver);
        });

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| DbError::DiskScheduler("scheduler is shut down".to_string()))?;
        sender
            .send(request)
            .map_err(|e| DbError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Reads `page_id` into `data` and waits for completion.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read {
            page_id,
            data: Box::new([0u8; PAGE_SIZE]),
            reply: tx,
        })?;

        let buf = Self::wait(rx)?;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Writes `data` to `page_id` and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: Box<PageData> = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_id,
            data: buf,
            reply: tx,
        })?;

        Self::wait(rx).map(|_| ())
    }

    fn wait(rx: Receiver<Result<Box<PageData>>>) -> Result<Box<PageData>> {
        rx.recv().map_err(|e| {
            DbError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// Processes requests until every sender is gone and the queue is drained.
    fn start_worker_thread(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver.iter() {
            Self::process_request(&disk_manager, request);
        }
        debug!("disk scheduler worker exiting");
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        let (result, reply) = match request {
            DiskRequest::Read {
                page_id,
                mut data,
                reply,
            } => (
                disk_manager.read_page(page_id, &mut data[..]).map(|_| data),
                reply,
            ),
            DiskRequest::Write {
                page_id,
                data,
                reply,
            } => (
                disk_manager.write_page(page_id, &data[..]).map(|_| data),
                reply,
            ),
        };

        if let Err(e) = &result {
            error!("disk request failed: {}", e);
        }
        let _ = reply.send(result);
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Disconnecting the queue lets the worker drain and exit.
        self.request_sender.take();

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
