//! Direct frame-buffer sessions
//!
//! A direct window bypasses the drawing protocol: the client draws straight
//! into the frame buffer and the server only tells it where it may draw.
//! Server and client share an anonymous memory area holding a
//! [`DirectBufferInfo`] header and the clip rectangles, plus two semaphores.
//!
//! Every change is a single-slot hand-off: the server writes the area,
//! releases the client's semaphore and waits, bounded, for the client to
//! release the acknowledgement semaphore. A client that misses the deadline
//! loses the session; later hand-offs fail fast.
//!
//! Hand-offs are stamped when their geometry is captured. A stamped hand-off
//! that reaches the slot after a newer one has been published is dropped,
//! so the client never goes back to stale geometry.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use log::{debug, info, warn};
use memmap2::MmapMut;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{DirectError, ServerError};
use crate::geometry::Rect;
use crate::ipc::link::SyncData;
use crate::region::Region;
use crate::resources::SessionResources;

/// Clip rectangles the shared area can hold.
pub const MAX_DIRECT_CLIP_RECTS: usize = 64;

const HEADER_SIZE: usize = size_of::<DirectBufferInfo>();
const RECT_SIZE: usize = size_of::<DirectRect>();
/// Size of the shared buffer-info area.
pub const AREA_SIZE: usize = HEADER_SIZE + MAX_DIRECT_CLIP_RECTS * RECT_SIZE;

/// Counting semaphore with bounded waits.
#[derive(Default)]
pub struct Semaphore {
    count: Mutex<u32>,
    available: Condvar,
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore").field("count", &*self.count.lock()).finish()
    }
}

impl Semaphore {
    pub fn new(count: u32) -> Self {
        Self {
            count: Mutex::new(count),
            available: Condvar::new(),
        }
    }

    pub fn release(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.available.notify_one();
    }

    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Waits up to `timeout`; returns whether a unit was taken.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count == 0 {
            if self.available.wait_until(&mut count, deadline).timed_out() && *count == 0 {
                return false;
            }
        }
        *count -= 1;
        true
    }

    pub fn count(&self) -> u32 {
        *self.count.lock()
    }
}

/// Rectangle as laid out in the shared area.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DirectRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl From<Rect> for DirectRect {
    fn from(r: Rect) -> Self {
        DirectRect {
            left: r.left,
            top: r.top,
            right: r.right,
            bottom: r.bottom,
        }
    }
}

impl From<DirectRect> for Rect {
    fn from(r: DirectRect) -> Self {
        Rect::new(r.left, r.top, r.right, r.bottom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BufferState {
    Start = 0,
    Stop = 1,
    Modify = 2,
}

impl BufferState {
    const MASK: u32 = 0xff;

    fn from_bits(bits: u32) -> Option<BufferState> {
        match bits & Self::MASK {
            0 => Some(BufferState::Start),
            1 => Some(BufferState::Stop),
            2 => Some(BufferState::Modify),
            _ => None,
        }
    }
}

bitflags! {
    /// What changed since the previous hand-off.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BufferFlags: u32 {
        const CLIPPING_MODIFIED = 0x100;
        const BUFFER_RESIZED = 0x200;
        const BUFFER_MOVED = 0x400;
    }
}

/// Header of the shared area. Clip rectangles follow it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DirectBufferInfo {
    /// [`BufferState`] in the low byte, [`BufferFlags`] above it.
    pub buffer_state: u32,
    pub serial: u32,
    pub bits_per_pixel: u32,
    pub bytes_per_row: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub window_bounds: DirectRect,
    /// Exact bounds of the clip, even when the rectangle list is truncated.
    pub clip_bounds: DirectRect,
    pub clip_count: u32,
    pub reserved: u32,
}

impl DirectBufferInfo {
    pub fn state(&self) -> Option<BufferState> {
        BufferState::from_bits(self.buffer_state)
    }

    pub fn flags(&self) -> BufferFlags {
        BufferFlags::from_bits_truncate(self.buffer_state)
    }
}

/// Screen description published with every hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
}

/// State of the single hand-off slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffSlot {
    Idle,
    /// Published and waiting for the client's acknowledgement.
    Outstanding,
    /// The client missed a deadline or disconnected.
    TornDown,
}

/// One window's direct frame-buffer connection.
pub struct DirectWindowSession {
    area_id: u32,
    notify_id: u32,
    ack_id: u32,
    area: Mutex<MmapMut>,
    /// Released by the server when new geometry is published.
    notify: Arc<Semaphore>,
    /// Released by the client once it has adopted the geometry.
    ack: Arc<Semaphore>,
    slot: Mutex<HandoffSlot>,
    slot_changed: Condvar,
    timeout: Duration,
    serial: AtomicU32,
    /// Last stamp handed out.
    issued: AtomicU64,
    /// Stamp of the newest published hand-off; written under `slot`.
    published: AtomicU64,
}

impl fmt::Debug for DirectWindowSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectWindowSession")
            .field("area_id", &self.area_id)
            .field("slot", &*self.slot.lock())
            .field("serial", &self.serial.load(Ordering::Relaxed))
            .finish()
    }
}

impl DirectWindowSession {
    /// Allocates the shared area and both semaphores and registers them in
    /// `resources`, where in-process clients look them up by id.
    pub fn connect(
        resources: &SessionResources,
        timeout: Duration,
    ) -> Result<Arc<DirectWindowSession>, ServerError> {
        let area = MmapMut::map_anon(AREA_SIZE).map_err(|err| {
            warn!("direct area allocation failed: {}", err);
            DirectError::AreaAllocation
        })?;
        let (notify_id, notify) = resources.semaphores.insert_with(|_| Semaphore::new(0))?;
        let (ack_id, ack) = match resources.semaphores.insert_with(|_| Semaphore::new(0)) {
            Ok(entry) => entry,
            Err(err) => {
                resources.semaphores.remove(notify_id);
                return Err(err);
            }
        };

        let built = resources.direct_areas.insert_with(|area_id| DirectWindowSession {
            area_id,
            notify_id,
            ack_id,
            area: Mutex::new(area),
            notify,
            ack,
            slot: Mutex::new(HandoffSlot::Idle),
            slot_changed: Condvar::new(),
            timeout,
            serial: AtomicU32::new(0),
            issued: AtomicU64::new(0),
            published: AtomicU64::new(0),
        });
        match built {
            Ok((area_id, session)) => {
                info!("direct session {} connected", area_id);
                Ok(session)
            }
            Err(err) => {
                resources.semaphores.remove(notify_id);
                resources.semaphores.remove(ack_id);
                Err(err)
            }
        }
    }

    /// Ids sent to the client in the connect reply, named from the client's
    /// side: it acquires the first semaphore and releases the second.
    pub fn sync_data(&self) -> SyncData {
        SyncData {
            area_id: self.area_id as i32,
            acquire_sem: self.notify_id as i32,
            release_sem: self.ack_id as i32,
        }
    }

    pub fn area_id(&self) -> u32 {
        self.area_id
    }

    pub fn slot(&self) -> HandoffSlot {
        *self.slot.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.slot() != HandoffSlot::TornDown
    }

    /// Stamp for geometry captured now. Later stamps supersede earlier ones.
    pub fn stamp(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publishes new geometry and waits for the client to take it.
    pub fn handoff(
        &self,
        state: BufferState,
        flags: BufferFlags,
        window: Rect,
        clip: &Region,
        screen: ScreenInfo,
    ) -> Result<(), DirectError> {
        self.handoff_stamped(self.stamp(), state, flags, window, clip, screen)
    }

    /// Like [`handoff`](Self::handoff) for geometry captured under `stamp`.
    /// Returns without publishing if a newer stamp got there first.
    pub fn handoff_stamped(
        &self,
        stamp: u64,
        state: BufferState,
        flags: BufferFlags,
        window: Rect,
        clip: &Region,
        screen: ScreenInfo,
    ) -> Result<(), DirectError> {
        let mut slot = self.slot.lock();
        let deadline = Instant::now() + self.timeout;
        while *slot == HandoffSlot::Outstanding {
            if self.slot_changed.wait_until(&mut slot, deadline).timed_out()
                && *slot == HandoffSlot::Outstanding
            {
                return Err(DirectError::TimedOut);
            }
        }
        if *slot == HandoffSlot::TornDown {
            return Err(DirectError::NotConnected);
        }
        let published = self.published.load(Ordering::SeqCst);
        if stamp <= published {
            debug!(
                "direct session {}: hand-off {} superseded by {}",
                self.area_id, stamp, published
            );
            return Ok(());
        }
        self.published.store(stamp, Ordering::SeqCst);
        *slot = HandoffSlot::Outstanding;
        drop(slot);

        let serial = self.serial.fetch_add(1, Ordering::Relaxed) + 1;
        self.publish(state, flags, window, clip, screen, serial);
        self.notify.release();
        let acknowledged = self.ack.acquire_timeout(self.timeout);

        let mut slot = self.slot.lock();
        let result = if acknowledged {
            if *slot == HandoffSlot::Outstanding {
                *slot = HandoffSlot::Idle;
            }
            debug!("direct session {}: hand-off {} acknowledged", self.area_id, serial);
            Ok(())
        } else {
            *slot = HandoffSlot::TornDown;
            warn!(
                "direct session {}: no acknowledgement within {:?}, tearing down",
                self.area_id, self.timeout
            );
            Err(DirectError::TimedOut)
        };
        self.slot_changed.notify_all();
        result
    }

    /// Marks the session dead; blocked and later hand-offs fail.
    pub fn teardown(&self) {
        let mut slot = self.slot.lock();
        if *slot != HandoffSlot::TornDown {
            info!("direct session {} torn down", self.area_id);
        }
        *slot = HandoffSlot::TornDown;
        self.slot_changed.notify_all();
    }

    /// Removes the area and semaphores from the registry.
    pub fn unregister(&self, resources: &SessionResources) {
        resources.direct_areas.remove(self.area_id);
        resources.semaphores.remove(self.notify_id);
        resources.semaphores.remove(self.ack_id);
    }

    fn publish(
        &self,
        state: BufferState,
        flags: BufferFlags,
        window: Rect,
        clip: &Region,
        screen: ScreenInfo,
        serial: u32,
    ) {
        let rects = clip.rects();
        let count = rects.len().min(MAX_DIRECT_CLIP_RECTS);
        if rects.len() > MAX_DIRECT_CLIP_RECTS {
            debug!(
                "direct session {}: clip of {} rects truncated to {}",
                self.area_id,
                rects.len(),
                MAX_DIRECT_CLIP_RECTS
            );
        }
        let info = DirectBufferInfo {
            buffer_state: state as u32 | flags.bits(),
            serial,
            bits_per_pixel: screen.bits_per_pixel,
            bytes_per_row: screen.width * screen.bits_per_pixel.div_ceil(8),
            screen_width: screen.width,
            screen_height: screen.height,
            window_bounds: window.into(),
            clip_bounds: clip.bounds().into(),
            clip_count: count as u32,
            reserved: 0,
        };

        let mut area = self.area.lock();
        area[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&info));
        for (i, rect) in rects.iter().take(count).enumerate() {
            let at = HEADER_SIZE + i * RECT_SIZE;
            area[at..at + RECT_SIZE].copy_from_slice(bytemuck::bytes_of(&DirectRect::from(*rect)));
        }
    }

    /// Reads the area the way a client does.
    pub fn read_info(&self) -> (DirectBufferInfo, Vec<Rect>) {
        let area = self.area.lock();
        let info: DirectBufferInfo = bytemuck::pod_read_unaligned(&area[..HEADER_SIZE]);
        let count = (info.clip_count as usize).min(MAX_DIRECT_CLIP_RECTS);
        let rects = (0..count)
            .map(|i| {
                let at = HEADER_SIZE + i * RECT_SIZE;
                Rect::from(bytemuck::pod_read_unaligned::<DirectRect>(&area[at..at + RECT_SIZE]))
            })
            .collect();
        (info, rects)
    }
}
