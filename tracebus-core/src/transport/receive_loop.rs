//! Background receive thread

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::udp::{UdpReceiver, RECV_BUFFER_SIZE};
use crate::error::{Result, TraceBusError};

/// Pause after a receive error before trying again
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Consumer of received datagrams
pub trait DatagramHandler: Send + Sync + 'static {
    fn on_datagram(&self, datagram: &[u8], source: SocketAddr);

    /// Called for receive failures other than timeouts; the loop keeps running
    fn on_receive_error(&self, error: &TraceBusError) {
        warn!(error = %error, "trace receive failed");
    }
}

/// Thread that reads datagrams from a [`UdpReceiver`] until stopped
pub struct ReceiveLoop {
    receiver: Arc<UdpReceiver>,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl ReceiveLoop {
    pub fn spawn<H: DatagramHandler>(receiver: UdpReceiver, handler: Arc<H>) -> Result<Self> {
        let receiver = Arc::new(receiver);
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_receiver = Arc::clone(&receiver);
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("tracebus-recv".to_string())
            .spawn(move || run(&thread_receiver, &thread_shutdown, handler.as_ref()))?;

        Ok(Self {
            receiver,
            shutdown,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.receiver.local_addr()
    }

    pub fn receiver(&self) -> &UdpReceiver {
        &self.receiver
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }

    /// Signal the thread, close the socket and wait for the thread to exit
    ///
    /// When called from the receive thread itself (a callback stopping its
    /// own sink) the join is skipped; the thread exits after the callback
    /// returns.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.receiver.close();

        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("trace receive thread panicked");
            }
        }
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(receiver: &UdpReceiver, shutdown: &AtomicBool, handler: &dyn DatagramHandler) {
    debug!(local = %receiver.local_addr(), "trace receive loop started");
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    while !shutdown.load(Ordering::Acquire) {
        match receiver.recv(&mut buf) {
            Ok(Some((len, source))) => handler.on_datagram(&buf[..len], source),
            Ok(None) => {}
            Err(TraceBusError::TransportClosed) => break,
            Err(e) => {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                handler.on_receive_error(&e);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    debug!(local = %receiver.local_addr(), "trace receive loop stopped");
}
