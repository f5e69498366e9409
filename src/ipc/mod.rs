//! Message ports
//!
//! A connection is a pair of unidirectional ports. Each port is an
//! unbounded tokio channel used from plain OS threads: the owning thread
//! blocks in [`PortReceiver::recv`], every other party holds a cloneable
//! [`PortHandle`]. When every handle to a port is dropped the receiver sees
//! the port vanish, which is how connection loss is detected.
//!
//! A message may carry one port handle, the capability used for the
//! bootstrap and window-creation handshakes.

pub mod link;

use log::trace;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::runtime::{self, Runtime};
use tokio::sync::mpsc::{
    self, error::TryRecvError, UnboundedReceiver, UnboundedSender, WeakUnboundedSender,
};

use crate::error::ServerError;

pub use link::{AttachmentReader, AttachmentWriter, Tag};

static NEXT_PORT_ID: AtomicU32 = AtomicU32::new(1);

/// One protocol message: a 4-byte code, its attachment stream, and an
/// optional port capability.
#[derive(Debug)]
pub struct Message {
    pub code: u32,
    pub data: Vec<u8>,
    pub port: Option<PortHandle>,
}

impl Message {
    pub fn new(code: u32, data: Vec<u8>) -> Self {
        Self { code, data, port: None }
    }

    pub fn with_port(mut self, port: PortHandle) -> Self {
        self.port = Some(port);
        self
    }

    pub fn reader(&self) -> AttachmentReader<'_> {
        AttachmentReader::new(&self.data)
    }
}

/// Sending side of a port.
#[derive(Clone)]
pub struct PortHandle {
    id: u32,
    name: &'static str,
    sender: UnboundedSender<Message>,
}

impl PortHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn send(&self, message: Message) -> Result<(), ServerError> {
        trace!("port {} ({}) <- {:#x}", self.id, self.name, message.code);
        self.sender.send(message).map_err(|_| ServerError::PortClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// A handle that does not keep the port alive.
    pub fn downgrade(&self) -> WeakPortHandle {
        WeakPortHandle {
            id: self.id,
            name: self.name,
            sender: self.sender.downgrade(),
        }
    }
}

impl fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortHandle({}, {})", self.id, self.name)
    }
}

/// Non-owning port handle, used by owners that must be able to reach a
/// port during teardown without masking its loss.
#[derive(Clone)]
pub struct WeakPortHandle {
    id: u32,
    name: &'static str,
    sender: WeakUnboundedSender<Message>,
}

impl WeakPortHandle {
    pub fn upgrade(&self) -> Option<PortHandle> {
        self.sender.upgrade().map(|sender| PortHandle {
            id: self.id,
            name: self.name,
            sender,
        })
    }
}

impl fmt::Debug for WeakPortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakPortHandle({}, {})", self.id, self.name)
    }
}

/// Receiving side of a port, owned by exactly one thread.
pub struct PortReceiver {
    id: u32,
    receiver: UnboundedReceiver<Message>,
    /// Drives timed waits; built on first use.
    timer: Option<Runtime>,
}

impl PortReceiver {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Blocks until a message arrives. `None` once every handle is gone.
    ///
    /// Must not be called from inside an async runtime.
    pub fn recv(&mut self) -> Option<Message> {
        self.receiver.blocking_recv()
    }

    /// Next queued message without blocking.
    pub fn try_recv(&mut self) -> Result<Option<Message>, ServerError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ServerError::PortClosed),
        }
    }

    /// Waits up to `timeout` for a message. Fails once the port is gone
    /// and drained.
    ///
    /// Must not be called from inside an async runtime.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Message>, ServerError> {
        let timer = match self.timer.take() {
            Some(timer) => timer,
            None => runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|_| ServerError::ResourceExhausted("port timer"))?,
        };
        let received = timer.block_on(async { tokio::time::timeout(timeout, self.receiver.recv()).await });
        self.timer = Some(timer);
        match received {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(ServerError::PortClosed),
            Err(_) => Ok(None),
        }
    }
}

impl fmt::Debug for PortReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortReceiver({})", self.id)
    }
}

/// Creates a new port.
pub fn port(name: &'static str) -> (PortHandle, PortReceiver) {
    let id = NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed);
    let (sender, receiver) = mpsc::unbounded_channel();
    (PortHandle { id, name, sender }, PortReceiver { id, receiver, timer: None })
}
