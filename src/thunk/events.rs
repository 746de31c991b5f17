#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::error::{HsaError, HsaResult};
use crate::kfd::device::KfdDevice;
use crate::kfd::ioctl::{CreateEventArgs, EventData, EventDataUnion, HsaSignalEventData, WaitEventsArgs};
use crate::kfd::sysfs::HsaNodeProperties;
use crate::thunk::memory::MemoryManager;
use std::os::fd::RawFd;
use std::os::unix::io::AsRawFd;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Size of the KFD-managed signal mailbox page. One slot is 8 bytes; 4KiB
/// supports 512 concurrently-registered interrupt-backed events per process.
const KFD_EVENT_PAGE_SIZE: usize = 4096;

/// Timeout sentinel returned by [`EventManager::wait_on_multiple_events`] when the
/// kernel reports the wait deadline elapsed before any event signaled.
pub const WAIT_TIMEOUT_ERRNO: i32 = -libc::ETIME;

const KFD_WAIT_RESULT_COMPLETE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HsaEventType {
    Signal = 0,
    NodeChange = 1,
    DeviceStateChange = 2,
    HwException = 3,
    SystemEvent = 4,
    DebugEvent = 5,
    ProfileEvent = 6,
    QueueEvent = 7,
    Memory = 8,
}

#[derive(Debug, Clone, Copy)]
pub struct HsaSyncVar {
    pub user_data: *mut std::ffi::c_void,
    pub sync_var_size: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct HsaEventDescriptor {
    pub event_type: HsaEventType,
    pub node_id: u32,
    pub sync_var: HsaSyncVar,
}

/// A KFD-backed event: the wakeup primitive behind every interrupt-mode [`Signal`](crate::thunk::signal::Signal).
#[derive(Debug)]
pub struct HsaEvent {
    pub event_id: u32,
    /// Address of this event's slot in the per-process mailbox page; this is
    /// what `AmdSignal::event_mailbox_ptr` points hardware at.
    pub hw_data2: u64,
    pub node_id: u32,
    auto_reset: bool,
    signaled: std::sync::Arc<AtomicBool>,
}

#[derive(Debug)]
struct EventPage {
    va: u64,
    /// The opaque `event_page_offset` the kernel handed back on first use; we
    /// echo it on every subsequent `CreateEvent` so new events share the page.
    kernel_offset: u64,
}

/// Owns the per-process KFD event mailbox page and issues create/destroy/wait
/// calls against it. One `EventManager` is expected per process (mirrored by
/// the `queue_event_` refcounting in the queue lifecycle).
#[derive(Debug)]
pub struct EventManager {
    nodes: Vec<HsaNodeProperties>,
    page: Mutex<Option<EventPage>>,
}

impl EventManager {
    #[must_use]
    pub fn new(nodes: &[HsaNodeProperties]) -> Self {
        Self {
            nodes: nodes.to_vec(),
            page: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn node(&self, node_id: u32) -> Option<&HsaNodeProperties> {
        self.nodes.get(node_id as usize)
    }

    /// Creates a new event, lazily mapping the shared mailbox page on first use.
    ///
    /// # Errors
    /// Returns an error if the `CreateEvent` ioctl fails or the mailbox page
    /// cannot be mmap'd.
    pub fn create_event(
        &self,
        device: &KfdDevice,
        _mem_mgr: &mut MemoryManager,
        _drm_fd: RawFd,
        desc: &HsaEventDescriptor,
        manual_reset: bool,
        is_signaled: bool,
    ) -> HsaResult<HsaEvent> {
        let mut guard = self.page.lock().unwrap();
        let existing_offset = guard.as_ref().map(|p| p.kernel_offset);

        let mut args = CreateEventArgs {
            event_page_offset: existing_offset.unwrap_or(0),
            event_trigger_data: 0,
            event_type: desc.event_type as u32,
            auto_reset: u32::from(!manual_reset),
            node_id: desc.node_id,
            event_id: 0,
            event_slot_index: 0,
        };

        device.create_event(&mut args)?;

        if guard.is_none() {
            let page_ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    KFD_EVENT_PAGE_SIZE,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    device.as_raw_fd(),
                    i64::try_from(args.event_page_offset).unwrap_or(0) as libc::off_t,
                )
            };
            if page_ptr == libc::MAP_FAILED {
                device.destroy_event(args.event_id).ok();
                return Err(HsaError::Io(std::io::Error::last_os_error()));
            }
            *guard = Some(EventPage {
                va: page_ptr as u64,
                kernel_offset: args.event_page_offset,
            });
        }

        let mailbox_base = guard.as_ref().unwrap().va;
        let hw_data2 = mailbox_base + u64::from(args.event_slot_index) * 8;

        Ok(HsaEvent {
            event_id: args.event_id,
            hw_data2,
            node_id: desc.node_id,
            auto_reset: !manual_reset,
            signaled: std::sync::Arc::new(AtomicBool::new(is_signaled)),
        })
    }

    /// Destroys a previously created event.
    ///
    /// # Errors
    /// Returns an error if the `DestroyEvent` ioctl fails.
    pub fn destroy_event(&self, device: &KfdDevice, event: &HsaEvent) -> HsaResult<()> {
        device.destroy_event(event.event_id)?;
        Ok(())
    }

    /// Sets the event to the signaled state.
    ///
    /// # Errors
    /// Returns an error if the `SetEvent` ioctl fails.
    pub fn set_event(&self, device: &KfdDevice, event: &HsaEvent) -> HsaResult<()> {
        device.set_event(event.event_id)?;
        event.signaled.store(true, Ordering::Release);
        Ok(())
    }

    /// Resets the event to the unsignaled state.
    ///
    /// # Errors
    /// Returns an error if the `ResetEvent` ioctl fails.
    pub fn reset_event(&self, device: &KfdDevice, event: &HsaEvent) -> HsaResult<()> {
        device.reset_event(event.event_id)?;
        event.signaled.store(false, Ordering::Release);
        Ok(())
    }

    /// Blocks until one (or, if `wait_for_all`, every) of `events` signals or
    /// `timeout_ms` elapses.
    ///
    /// Returns the indices (into `events`) that were observed signaled.
    ///
    /// # Errors
    /// Returns `Err(WAIT_TIMEOUT_ERRNO)` on timeout, or the raw negated errno
    /// on any other ioctl failure.
    pub fn wait_on_multiple_events(
        &self,
        device: &KfdDevice,
        events: &[&HsaEvent],
        wait_for_all: bool,
        timeout_ms: u32,
    ) -> Result<Vec<usize>, i32> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut event_data: Vec<EventData> = events
            .iter()
            .map(|e| EventData {
                payload: EventDataUnion {
                    signal_event_data: HsaSignalEventData { last_event_age: 0 },
                },
                kfd_event_data_ext: 0,
                event_id: e.event_id,
                pad: 0,
            })
            .collect();

        let mut args = WaitEventsArgs {
            events_ptr: event_data.as_mut_ptr() as u64,
            num_events: event_data.len() as u32,
            wait_for_all: u32::from(wait_for_all),
            timeout: timeout_ms,
            wait_result: 0,
        };

        if let Err(e) = device.wait_events(&mut args) {
            return Err(e.raw_os_error().unwrap_or(-1));
        }

        if args.wait_result != KFD_WAIT_RESULT_COMPLETE {
            return Err(WAIT_TIMEOUT_ERRNO);
        }

        if events.len() == 1 {
            if events[0].auto_reset {
                events[0].signaled.store(false, Ordering::Release);
            }
            return Ok(vec![0]);
        }

        let mut signaled_indices = Vec::new();
        for (i, ev) in events.iter().enumerate() {
            if ev.signaled.load(Ordering::Acquire) {
                signaled_indices.push(i);
                if ev.auto_reset {
                    ev.signaled.store(false, Ordering::Release);
                }
            }
        }
        if signaled_indices.is_empty() {
            signaled_indices.push(0);
        }
        Ok(signaled_indices)
    }
}
