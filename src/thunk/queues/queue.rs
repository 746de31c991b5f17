//! Queue lifecycle: the producer-facing object that ties the ring allocator,
//! doorbell driver, signal subsystem, and scratch/exception fault handlers
//! into one thing a caller can submit AQL packets through.
//!
//! Construction order mirrors the dependency chain: ring, then the two
//! signals the fault handlers wait on, then the KFD queue itself (which
//! needs the ring's address to hand the command processor), then the
//! doorbell and CU mask state that depend on the KFD-assigned queue ID.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_ptr_alignment)]

use std::os::fd::RawFd;
use std::ptr;
use std::sync::atomic::{fence, AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::{HsaError, HsaResult, QueueErrorKind};
use crate::kfd::device::KfdDevice;
use crate::kfd::ioctl::{AllocQueueGwsArgs, SetScratchBackingVaArgs, UpdateQueueArgs};
use crate::kfd::sysfs::HsaNodeProperties;
use crate::thunk::async_handler::{AsyncHandlerRegistry, HandlerOutcome};
use crate::thunk::events::EventManager;
use crate::thunk::memory::manager::ScratchAcquireOutcome;
use crate::thunk::memory::{Allocation, ArcManager};
use crate::thunk::queues::builder::{
    HsaQueue, MemoryManager as QueueMemMgr, QueueBuilder, QueuePriority, QueueType,
};
use crate::thunk::queues::cu_mask::{CuMaskOutcome, CuMaskState};
use crate::thunk::queues::doorbell::{DoorbellDriver, DoorbellVariant};
use crate::thunk::queues::exception::{classify_exception_bitmask, classify_inactive_bitmask};
use crate::thunk::queues::packets::{self, KernelDispatchPacket};
use crate::thunk::queues::ring::{self, RingAllocation};
use crate::thunk::queues::scratch::{self, ScratchRequest};
use crate::thunk::queues::srd::{self, ScratchSrd};
use crate::thunk::signal::{HsaSignalCondition, HsaWaitState, Signal};

const STATE_TERMINATE: u8 = 1 << 0;
const STATE_DONE: u8 = 1 << 1;
const STATE_SCRATCH_RETRY: u8 = 1 << 2;
const MAX_SCRATCH_RETRIES: u32 = 8;
/// Backoff before retrying a contended scratch allocation. Timed on a
/// dedicated one-shot thread, never on the shared async-handler thread.
const SCRATCH_RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// `queue_properties` bits (spec §3): `IS_PTR64` is fixed at construction,
/// `USE_SCRATCH_ONCE` toggles with scratch grow/reclaim.
const QUEUE_PROP_IS_PTR64: u32 = 1 << 0;
const QUEUE_PROP_USE_SCRATCH_ONCE: u32 = 1 << 1;

/// Below this firmware version, ISA-8 command processors don't flush a
/// large scratch allocation's writes without an explicit SYSTEM-scope
/// release fence patched into the faulting dispatch packet's header.
const ISA8_SCRATCH_FENCE_FW_VERSION: u32 = 729;

/// Callback invoked (once per surfaced fault) with the decoded error and the
/// queue's ID. Runs on the shared async-handler thread, so it must not block.
pub type ErrorsCallback = Box<dyn FnMut(QueueErrorKind, u32) + Send>;

/// Parameters for [`AqlQueue::create`] that aren't implied by the agent.
#[derive(Clone)]
pub struct AqlQueueConfig {
    /// Ring capacity in packets; must be a power of two.
    pub packet_count: u32,
    pub priority: QueuePriority,
    /// Route exceptions through their own signal/handler instead of folding
    /// them into the scratch (inactive-signal) channel.
    pub handle_exceptions_separately: bool,
    /// Cooperative-dispatch (GWS) mode: `Destroy` releases the GWS resource
    /// instead of running the full teardown protocol.
    pub cooperative: bool,
    /// Process-wide CU mask this queue's requested mask is ANDed against.
    pub global_cu_mask: Option<Vec<u32>>,
}

impl Default for AqlQueueConfig {
    fn default() -> Self {
        Self {
            packet_count: 256,
            priority: QueuePriority::Normal,
            handle_exceptions_separately: true,
            cooperative: false,
            global_cu_mask: None,
        }
    }
}

#[derive(Default)]
struct ScratchState {
    allocation: Option<Allocation>,
    request: ScratchRequest,
    srd: ScratchSrd,
    /// `COMPUTE_TMPRING_SIZE` programmed for the current allocation; 0 when
    /// no scratch backs the queue.
    tmpring_size: u32,
    retry_count: u32,
    /// GPU VA of the current scratch backing allocation, mirrored out of
    /// `allocation` for the `scratch_backing_memory_location` accessor.
    backing_memory_location: u64,
    backing_memory_byte_size: u64,
    wave64_lane_byte_size: u32,
}

/// A live AQL compute queue: ring, doorbell, KFD handle, and the async fault
/// handlers that keep it running without the producer's involvement.
pub struct AqlQueue {
    ring: RingAllocation,
    doorbell: DoorbellDriver,
    kfd: Mutex<Option<HsaQueue>>,
    queue_id: u32,

    device: Arc<KfdDevice>,
    mem_mgr: ArcManager,
    event_manager: Arc<EventManager>,
    handlers: Arc<AsyncHandlerRegistry>,

    node: HsaNodeProperties,
    node_id: u32,
    drm_fd: RawFd,
    isa_major: u32,

    active: AtomicBool,
    write_dispatch_id: AtomicI64,

    inactive_signal: Arc<Signal>,
    exception_signal: Arc<Signal>,
    handle_exceptions_separately: bool,

    scratch: Mutex<ScratchState>,
    cu_mask: CuMaskState,
    global_cu_mask: Mutex<Option<Vec<u32>>>,

    pm4_ib: Mutex<Allocation>,

    scratch_state: AtomicU8,
    exception_state: AtomicU8,

    /// `queue_properties` bit-set (`QUEUE_PROP_*`); `IS_PTR64` is fixed at
    /// construction, `USE_SCRATCH_ONCE` tracks the current scratch grant.
    queue_properties: AtomicU32,

    /// High 16 bits of the group (LDS) segment aperture base, latched at
    /// construction — the group aperture is mandatory (spec §4.3 step 5).
    group_segment_aperture_base_hi: u32,
    /// High 16 bits of the private (scratch) segment aperture base, or 0
    /// when the node has no scratch aperture at all.
    private_segment_aperture_base_hi: u32,

    cooperative: bool,
    errors_callback: Mutex<Option<ErrorsCallback>>,
}

unsafe impl Send for AqlQueue {}
unsafe impl Sync for AqlQueue {}

impl AqlQueue {
    /// Builds and activates a new queue on `node`.
    ///
    /// # Errors
    /// Returns an error if the ring, signals, PM4 scratch buffer, or the
    /// underlying KFD `CreateQueue` ioctl fail.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        device: Arc<KfdDevice>,
        mem_mgr: ArcManager,
        event_manager: Arc<EventManager>,
        handlers: Arc<AsyncHandlerRegistry>,
        node: &HsaNodeProperties,
        node_id: u32,
        drm_fd: RawFd,
        config: AqlQueueConfig,
        errors_callback: Option<ErrorsCallback>,
    ) -> HsaResult<Arc<Self>> {
        let isa_major = node.engine_id.major;
        let legacy_workaround = ring::requires_legacy_workaround(node);

        let ring = ring::allocate_ring(config.packet_count, legacy_workaround)?;

        let inactive_signal = {
            let mut guard = mem_mgr.lock().unwrap();
            Signal::new(0, &device, &event_manager, &mut guard, drm_fd, node_id)?
        };
        let exception_signal = {
            let mut guard = mem_mgr.lock().unwrap();
            Signal::new(0, &device, &event_manager, &mut guard, drm_fd, node_id)?
        };
        let inactive_signal = Arc::new(inactive_signal);
        let exception_signal = Arc::new(exception_signal);

        let kfd_queue = {
            let mut guard = mem_mgr.lock().unwrap();
            let mem_mgr_dyn: &mut dyn QueueMemMgr = &mut *guard;
            QueueBuilder::new(
                &device,
                mem_mgr_dyn,
                node,
                node_id,
                drm_fd,
                ring.base_ptr() as u64,
                ring.bytes_per_copy() as u64,
            )
            .with_type(QueueType::ComputeAql)
            .with_priority(config.priority)
            .create()?
        };

        let queue_id = kfd_queue.queue_id;

        let doorbell_variant = DoorbellVariant::for_engine(node.engine_id.major, node.engine_id.minor);
        let doorbell = DoorbellDriver::new(
            kfd_queue.doorbell_ptr(),
            doorbell_variant,
            ring.packet_count(),
            legacy_workaround,
        );

        let cu_count = (node.simd_count / node.simd_per_cu.max(1)).max(1);
        let cu_mask = CuMaskState::new(cu_count);
        if let Some(global) = &config.global_cu_mask {
            let _ = cu_mask.set(&device, queue_id, Some(global), &[]);
        }

        let pm4_ib = {
            let mut guard = mem_mgr.lock().unwrap();
            guard.allocate_gpu_memory(&device, 4096, 4096, false, true, drm_fd)?
        };

        let (group_base, private_base) = {
            let guard = mem_mgr.lock().unwrap();
            guard
                .aperture_bases(node_id)
                .ok_or(HsaError::Queue(QueueErrorKind::InvalidQueueCreation))?
        };
        let group_segment_aperture_base_hi = (group_base >> 32) as u32;
        let private_segment_aperture_base_hi = (private_base >> 32) as u32;

        let queue = Arc::new(Self {
            ring,
            doorbell,
            kfd: Mutex::new(Some(kfd_queue)),
            queue_id,
            device,
            mem_mgr,
            event_manager,
            handlers,
            node: node.clone(),
            node_id,
            drm_fd,
            isa_major,
            active: AtomicBool::new(true),
            write_dispatch_id: AtomicI64::new(0),
            inactive_signal,
            exception_signal,
            handle_exceptions_separately: config.handle_exceptions_separately,
            scratch: Mutex::new(ScratchState::default()),
            cu_mask,
            global_cu_mask: Mutex::new(config.global_cu_mask),
            pm4_ib: Mutex::new(pm4_ib),
            scratch_state: AtomicU8::new(0),
            exception_state: AtomicU8::new(0),
            queue_properties: AtomicU32::new(QUEUE_PROP_IS_PTR64),
            group_segment_aperture_base_hi,
            private_segment_aperture_base_hi,
            cooperative: config.cooperative,
            errors_callback: Mutex::new(errors_callback),
        });

        let weak_scratch = Arc::downgrade(&queue);
        queue.handlers.register(
            queue.inactive_signal.clone(),
            HsaSignalCondition::Ne,
            0,
            Box::new(move || {
                weak_scratch
                    .upgrade()
                    .map_or(HandlerOutcome::Unarmed, |q| q.scratch_handler_tick())
            }),
        );

        if queue.handle_exceptions_separately {
            let weak_exc = Arc::downgrade(&queue);
            queue.handlers.register(
                queue.exception_signal.clone(),
                HsaSignalCondition::Ne,
                0,
                Box::new(move || {
                    weak_exc
                        .upgrade()
                        .map_or(HandlerOutcome::Unarmed, |q| q.exception_handler_tick())
                }),
            );
        }

        Ok(queue)
    }

    #[must_use]
    pub const fn queue_id(&self) -> u32 {
        self.queue_id
    }

    #[must_use]
    pub const fn group_segment_aperture_base_hi(&self) -> u32 {
        self.group_segment_aperture_base_hi
    }

    #[must_use]
    pub const fn private_segment_aperture_base_hi(&self) -> u32 {
        self.private_segment_aperture_base_hi
    }

    #[must_use]
    pub fn scratch_backing_memory_location(&self) -> u64 {
        self.scratch.lock().unwrap().backing_memory_location
    }

    #[must_use]
    pub fn scratch_backing_memory_byte_size(&self) -> u64 {
        self.scratch.lock().unwrap().backing_memory_byte_size
    }

    #[must_use]
    pub fn scratch_wave64_lane_byte_size(&self) -> u32 {
        self.scratch.lock().unwrap().wave64_lane_byte_size
    }

    #[must_use]
    pub fn queue_properties(&self) -> u32 {
        self.queue_properties.load(Ordering::Acquire)
    }

    // =====================================================================
    // Producer-facing read/write index API
    // =====================================================================

    #[must_use]
    pub fn load_read_index_relaxed(&self) -> i64 {
        let guard = self.kfd.lock().unwrap();
        guard
            .as_ref()
            .map_or(0, |q| unsafe { q.read_dispatch_id_ptr().read_volatile() })
    }

    #[must_use]
    pub fn load_read_index_acquire(&self) -> i64 {
        let v = self.load_read_index_relaxed();
        fence(Ordering::Acquire);
        v
    }

    #[must_use]
    pub fn load_write_index_relaxed(&self) -> i64 {
        self.write_dispatch_id.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn load_write_index_acquire(&self) -> i64 {
        self.write_dispatch_id.load(Ordering::Acquire)
    }

    pub fn store_write_index_relaxed(&self, value: i64) {
        self.write_dispatch_id.store(value, Ordering::Relaxed);
    }

    pub fn store_write_index_release(&self, value: i64) {
        self.write_dispatch_id.store(value, Ordering::Release);
    }

    pub fn add_write_index_relaxed(&self, value: i64) -> i64 {
        self.write_dispatch_id.fetch_add(value, Ordering::Relaxed)
    }

    pub fn add_write_index_acquire(&self, value: i64) -> i64 {
        self.write_dispatch_id.fetch_add(value, Ordering::Acquire)
    }

    pub fn add_write_index_release(&self, value: i64) -> i64 {
        self.write_dispatch_id.fetch_add(value, Ordering::Release)
    }

    pub fn add_write_index_acq_rel(&self, value: i64) -> i64 {
        self.write_dispatch_id.fetch_add(value, Ordering::AcqRel)
    }

    pub fn cas_write_index_acq_rel(&self, expected: i64, value: i64) -> i64 {
        self.write_dispatch_id
            .compare_exchange(expected, value, Ordering::AcqRel, Ordering::Acquire)
            .unwrap_or_else(|x| x)
    }

    /// Address of ring slot `index`, wrapped to the ring's capacity.
    #[must_use]
    pub fn slot_ptr(&self, index: i64) -> *mut u8 {
        self.ring.slot(index as u64)
    }

    /// Rings the doorbell to announce packets enqueued up to `write_index`.
    pub fn ring_doorbell(&self, write_index: i64) {
        let read_index = self.load_read_index_relaxed();
        self.doorbell.ring(write_index, read_index);
    }

    // =====================================================================
    // CU masking
    // =====================================================================

    /// # Errors
    /// Returns an error if the `SetCuMask` ioctl fails.
    pub fn set_cu_masking(&self, requested: &[u32]) -> HsaResult<CuMaskOutcome> {
        let global = self.global_cu_mask.lock().unwrap().clone();
        self.cu_mask.set(&self.device, self.queue_id, global.as_deref(), requested)
    }

    pub fn get_cu_masking(&self, out: &mut [u32]) {
        self.cu_mask.get(out);
    }

    pub fn set_global_cu_mask(&self, mask: Option<Vec<u32>>) {
        *self.global_cu_mask.lock().unwrap() = mask;
    }

    // =====================================================================
    // Lifecycle
    // =====================================================================

    /// Sets `queue_percentage` to zero without destroying the KFD queue.
    ///
    /// # Errors
    /// Returns an error if the `UpdateQueue` ioctl fails.
    pub fn suspend(&self) -> HsaResult<()> {
        let guard = self.kfd.lock().unwrap();
        let Some(q) = guard.as_ref() else {
            return Ok(());
        };
        let mut args = UpdateQueueArgs {
            ring_base_address: self.ring.base_ptr() as u64,
            queue_id: q.queue_id,
            ring_size: self.ring.bytes_per_copy() as u32,
            queue_percentage: 0,
            queue_priority: QueuePriority::Normal.raw(),
        };
        self.device.update_queue(&mut args).map_err(HsaError::from)
    }

    /// Re-programs queue priority via `UpdateQueue`, at full `queue_percentage`.
    ///
    /// # Errors
    /// Returns an error if the queue was already inactivated or the
    /// `UpdateQueue` ioctl fails.
    pub fn set_priority(&self, priority: QueuePriority) -> HsaResult<()> {
        let guard = self.kfd.lock().unwrap();
        let Some(q) = guard.as_ref() else {
            return Err(HsaError::Queue(QueueErrorKind::InvalidQueue));
        };
        let mut args = UpdateQueueArgs {
            ring_base_address: self.ring.base_ptr() as u64,
            queue_id: q.queue_id,
            ring_size: self.ring.bytes_per_copy() as u32,
            queue_percentage: 100,
            queue_priority: priority.raw(),
        };
        self.device.update_queue(&mut args).map_err(HsaError::from)
    }

    /// Idempotently tears down the KFD queue without waiting on the fault
    /// handlers. Safe to call from [`Drop`]; [`Self::destroy`] is the
    /// synchronous, handler-coordinated teardown producers should prefer.
    pub fn inactivate(&self) {
        if self
            .active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.kfd.lock().unwrap().take();
            fence(Ordering::Acquire);
        }
    }

    /// Grants (or, with `num_gws == 0`, releases) Global Wave Sync resources
    /// for cooperative-dispatch mode.
    ///
    /// # Errors
    /// Returns an error if the queue was already inactivated or the
    /// `AllocQueueGws` ioctl fails.
    pub fn enable_gws(&self, num_gws: u32) -> HsaResult<()> {
        let guard = self.kfd.lock().unwrap();
        let Some(q) = guard.as_ref() else {
            return Err(HsaError::Queue(QueueErrorKind::InvalidQueue));
        };
        let mut args = AllocQueueGwsArgs {
            queue_id: q.queue_id,
            num_gws,
            first_gws: 0,
            pad: 0,
        };
        self.device.alloc_queue_gws(&mut args).map_err(HsaError::from)
    }

    /// Synchronously tears the queue down: signals both fault handlers to
    /// terminate, blocks until each has acknowledged, then destroys the KFD
    /// queue. Cooperative queues release their GWS grant instead of running
    /// the handler handshake, since GWS queues don't register one.
    pub fn destroy(self: Arc<Self>) {
        if self.cooperative {
            let _ = self.enable_gws(0);
            self.inactivate();
            return;
        }

        self.scratch_state.fetch_or(STATE_TERMINATE, Ordering::AcqRel);
        let _ = self
            .inactive_signal
            .store_release(i64::from(u32::MAX), &self.device, &self.event_manager);
        self.inactive_signal.wait_acquire(
            HsaSignalCondition::Eq,
            -1,
            u64::MAX,
            HsaWaitState::Blocked,
            &self.device,
            &self.event_manager,
        );

        if self.handle_exceptions_separately {
            self.exception_state.fetch_or(STATE_TERMINATE, Ordering::AcqRel);
            let _ = self.exception_signal.store_release(
                i64::from(u32::MAX),
                &self.device,
                &self.event_manager,
            );
            self.exception_signal.wait_acquire(
                HsaSignalCondition::Eq,
                -1,
                u64::MAX,
                HsaWaitState::Blocked,
                &self.device,
                &self.event_manager,
            );
        }

        self.inactivate();
    }

    // =====================================================================
    // PM4 command injection
    // =====================================================================

    /// Splices raw PM4 into the queue via a single AQL slot carrying an
    /// `INDIRECT_BUFFER` jump to a scratch command buffer.
    ///
    /// # Errors
    /// Returns an error if `cmd` doesn't fit the PM4 scratch buffer.
    pub fn execute_pm4(&self, cmd: &[u32]) -> HsaResult<()> {
        if cmd.len() * 4 > self.pm4_ib.lock().unwrap().size {
            return Err(HsaError::Queue(QueueErrorKind::InvalidArgument));
        }

        let ib_va = {
            let ib = self.pm4_ib.lock().unwrap();
            unsafe {
                ptr::copy_nonoverlapping(cmd.as_ptr(), ib.ptr.cast::<u32>(), cmd.len());
            }
            ib.gpu_va
        };

        let ring_packets = self.ring.packet_count() as i64;
        let idx = self.write_dispatch_id.fetch_add(1, Ordering::AcqRel);

        while ring_full(idx, self.load_read_index_acquire(), ring_packets) {
            std::hint::spin_loop();
        }

        let words = build_pm4_slot(self.isa_major, ib_va, cmd.len() as u32);
        let dst = self.ring.slot(idx as u64).cast::<u32>();
        unsafe {
            for (i, w) in words.iter().enumerate().skip(1) {
                dst.add(i).write_volatile(*w);
            }
            fence(Ordering::Release);
            dst.write_volatile(words[0]);
        }

        self.ring_doorbell(idx + 1);

        while self.load_read_index_acquire() <= idx {
            std::hint::spin_loop();
        }

        Ok(())
    }

    // =====================================================================
    // Fault handlers
    // =====================================================================

    /// Reads the ring slot the read index currently points at and validates
    /// it's a `KERNEL_DISPATCH` packet before interpreting its fields — a
    /// scratch fault only ever arises from a dispatch, never a barrier or
    /// vendor packet. Debug builds assert; release builds degrade to `None`
    /// rather than interpreting an arbitrary packet's bytes as dispatch
    /// fields.
    fn read_faulting_packet(&self) -> Option<KernelDispatchPacket> {
        let read_idx = self.load_read_index_relaxed();
        let packet = unsafe { KernelDispatchPacket::from_slot(self.ring.slot(read_idx as u64)) };
        debug_assert_eq!(
            packets::packet_type(packet.header),
            packets::AQL_PACKET_TYPE_KERNEL_DISPATCH,
            "scratch fault on a non-dispatch packet"
        );
        if packets::packet_type(packet.header) == packets::AQL_PACKET_TYPE_KERNEL_DISPATCH {
            Some(packet)
        } else {
            None
        }
    }

    fn max_cu_id(&self) -> u32 {
        (self.node.simd_count / self.node.simd_per_cu.max(1)).saturating_sub(1)
    }

    fn surface_error(&self, kind: QueueErrorKind) {
        if let Some(cb) = self.errors_callback.lock().unwrap().as_mut() {
            cb(kind, self.queue_id);
        }
    }

    fn finalize_channel(&self, signal: &Signal, state: &AtomicU8) -> HandlerOutcome {
        state.fetch_or(STATE_DONE, Ordering::AcqRel);
        let _ = signal.store_release(-1, &self.device, &self.event_manager);
        HandlerOutcome::Unarmed
    }

    fn reclaim_scratch(&self) {
        let mut guard = self.scratch.lock().unwrap();
        if let Some(alloc) = guard.allocation.take() {
            self.mem_mgr.lock().unwrap().release_queue_scratch(alloc);
        }
        guard.request = ScratchRequest::default();
        guard.srd = ScratchSrd::default();
        guard.tmpring_size = 0;
        guard.retry_count = 0;
        guard.backing_memory_location = 0;
        guard.backing_memory_byte_size = 0;
        guard.wave64_lane_byte_size = 0;
        drop(guard);

        self.queue_properties.fetch_and(!QUEUE_PROP_USE_SCRATCH_ONCE, Ordering::AcqRel);

        let mut backing_va_args = SetScratchBackingVaArgs {
            va_addr: 0,
            gpu_id: self.node.kfd_gpu_id,
            pad: 0,
        };
        let _ = self.device.set_scratch_backing_va(&mut backing_va_args);
    }

    /// Scratch-fault (inactive signal) handler, invoked on the shared async
    /// dispatch thread. Decodes insufficient-scratch and large-scratch
    /// faults itself; anything else either finalizes teardown or, when
    /// exceptions share this channel, is surfaced via `errors_callback`.
    fn scratch_handler_tick(self: &Arc<Self>) -> HandlerOutcome {
        if self.scratch_state.load(Ordering::Acquire) & STATE_TERMINATE != 0 {
            return self.finalize_channel(&self.inactive_signal, &self.scratch_state);
        }

        let error_code = self.inactive_signal.load_acquire() as u32;

        if scratch::is_large_scratch_reclaim(error_code) {
            self.reclaim_scratch();
            let _ = self
                .inactive_signal
                .store_release(0, &self.device, &self.event_manager);
            return HandlerOutcome::Armed;
        }

        if scratch::is_insufficient_scratch(error_code) {
            return self.handle_insufficient_scratch(error_code);
        }

        if self.handle_exceptions_separately {
            // Not a scratch fault and exceptions have their own channel;
            // nothing for this handler to do besides keep watching.
            let _ = self
                .inactive_signal
                .store_release(0, &self.device, &self.event_manager);
            return HandlerOutcome::Armed;
        }

        let kind = classify_inactive_bitmask(error_code);
        let _ = self.suspend();
        self.surface_error(kind);
        self.finalize_channel(&self.inactive_signal, &self.scratch_state)
    }

    /// Patches the faulting dispatch packet's header in-place to add a
    /// SYSTEM-scope release fence. ISA-8 command processors below firmware
    /// 729 don't flush a freshly grown large-scratch allocation's writes on
    /// their own; this forces the flush through the dispatch's own fence.
    fn patch_release_fence_for_large_scratch(&self) {
        if self.isa_major != 8 || self.node.fw_version >= ISA8_SCRATCH_FENCE_FW_VERSION {
            return;
        }
        let read_idx = self.load_read_index_relaxed();
        let slot = self.ring.slot(read_idx as u64);
        unsafe {
            let header_ptr = slot.cast::<u16>();
            let header = header_ptr.read_volatile();
            if packets::packet_type(header) == packets::AQL_PACKET_TYPE_KERNEL_DISPATCH {
                header_ptr.write_volatile(packets::with_release_scope(header, packets::AQL_FENCE_SCOPE_SYSTEM));
            }
        }
    }

    fn handle_insufficient_scratch(self: &Arc<Self>, error_code: u32) -> HandlerOutcome {
        self.scratch_state.fetch_and(!STATE_SCRATCH_RETRY, Ordering::AcqRel);

        let Some(packet) = self.read_faulting_packet() else {
            let _ = self.suspend();
            self.surface_error(QueueErrorKind::Error);
            return self.finalize_channel(&self.inactive_signal, &self.scratch_state);
        };
        let max_cu_id = self.max_cu_id();
        let request = scratch::compute_request(
            error_code,
            &packet,
            max_cu_id,
            self.node.max_slots_scratch_cu,
            self.node.num_shader_banks,
        );

        let needs_growth = {
            let guard = self.scratch.lock().unwrap();
            guard
                .allocation
                .as_ref()
                .is_none_or(|a| (a.size as u64) < request.dispatch_size)
        };

        if !needs_growth {
            self.scratch.lock().unwrap().request = request;
            let _ = self
                .inactive_signal
                .store_release(0, &self.device, &self.event_manager);
            return HandlerOutcome::Armed;
        }

        let size = request.max_size.max(request.dispatch_size) as usize;
        let is_large = size as u64 >= request.max_size;
        let acquired = self
            .mem_mgr
            .lock()
            .unwrap()
            .acquire_queue_scratch(&self.device, size, self.node_id, self.drm_fd);

        match acquired {
            Ok(ScratchAcquireOutcome::Allocated(alloc)) => {
                let wave64 = request.lanes_per_wave == 64;
                let srd = srd::build(alloc.gpu_va, alloc.size as u64, wave64, self.isa_major);

                let mut backing_va_args = SetScratchBackingVaArgs {
                    va_addr: alloc.gpu_va,
                    gpu_id: self.node.kfd_gpu_id,
                    pad: 0,
                };
                let _ = self.device.set_scratch_backing_va(&mut backing_va_args);

                let tmpring = scratch_tmpring_size(&request, alloc.size as u64);

                let mut guard = self.scratch.lock().unwrap();
                guard.backing_memory_location = alloc.gpu_va;
                guard.backing_memory_byte_size = alloc.size as u64;
                guard.wave64_lane_byte_size = request.size_per_thread;
                guard.allocation = Some(alloc);
                guard.request = request;
                guard.srd = srd;
                guard.tmpring_size = tmpring;
                guard.retry_count = 0;
                drop(guard);

                if is_large {
                    self.queue_properties.fetch_or(QUEUE_PROP_USE_SCRATCH_ONCE, Ordering::AcqRel);
                    self.patch_release_fence_for_large_scratch();
                } else {
                    self.queue_properties
                        .fetch_and(!QUEUE_PROP_USE_SCRATCH_ONCE, Ordering::AcqRel);
                }

                let _ = self
                    .inactive_signal
                    .store_release(0, &self.device, &self.event_manager);
                HandlerOutcome::Armed
            }
            Ok(ScratchAcquireOutcome::Retry) => {
                let retries = {
                    let mut guard = self.scratch.lock().unwrap();
                    guard.retry_count += 1;
                    guard.retry_count
                };

                if retries > MAX_SCRATCH_RETRIES {
                    self.surface_error(QueueErrorKind::OutOfResources);
                    let _ = self
                        .inactive_signal
                        .store_release(0, &self.device, &self.event_manager);
                    return HandlerOutcome::Armed;
                }

                // Transient VA contention, not exhaustion. The backoff runs
                // on its own one-shot thread so the shared async-handler
                // thread stays free to service other queues' faults while
                // this one waits; only the re-arm touches the registry.
                self.scratch_state.fetch_or(STATE_SCRATCH_RETRY, Ordering::AcqRel);
                let weak = Arc::downgrade(self);
                let handlers = self.handlers.clone();
                let inactive_signal = self.inactive_signal.clone();
                let spawned = thread::Builder::new().name("hsa-scratch-retry".into()).spawn(move || {
                    thread::sleep(SCRATCH_RETRY_BACKOFF);
                    handlers.register(
                        inactive_signal,
                        HsaSignalCondition::Ne,
                        0,
                        Box::new(move || {
                            weak.upgrade()
                                .map_or(HandlerOutcome::Unarmed, |q| q.scratch_handler_tick())
                        }),
                    );
                });

                if spawned.is_err() {
                    self.surface_error(QueueErrorKind::OutOfResources);
                    let _ = self
                        .inactive_signal
                        .store_release(0, &self.device, &self.event_manager);
                    return HandlerOutcome::Armed;
                }
                HandlerOutcome::Unarmed
            }
            Err(_) => {
                self.surface_error(QueueErrorKind::OutOfResources);
                let _ = self
                    .inactive_signal
                    .store_release(0, &self.device, &self.event_manager);
                HandlerOutcome::Armed
            }
        }
    }

    /// Dedicated exception-signal handler. Only registered when
    /// `handle_exceptions_separately` is set; fires at most once, since a
    /// surfaced exception suspends the queue and the handler is done.
    fn exception_handler_tick(self: &Arc<Self>) -> HandlerOutcome {
        if self.exception_state.load(Ordering::Acquire) & STATE_TERMINATE != 0 {
            return self.finalize_channel(&self.exception_signal, &self.exception_state);
        }

        let raw = self.exception_signal.load_acquire() as u32;
        let kind = classify_exception_bitmask(raw);
        let _ = self.suspend();
        self.surface_error(kind);
        self.finalize_channel(&self.exception_signal, &self.exception_state)
    }
}

impl Drop for AqlQueue {
    fn drop(&mut self) {
        self.scratch_state.fetch_or(STATE_TERMINATE, Ordering::AcqRel);
        self.exception_state.fetch_or(STATE_TERMINATE, Ordering::AcqRel);
        let _ = self
            .inactive_signal
            .store_release(i64::from(u32::MAX), &self.device, &self.event_manager);
        if self.handle_exceptions_separately {
            let _ = self.exception_signal.store_release(
                i64::from(u32::MAX),
                &self.device,
                &self.event_manager,
            );
        }
        self.inactivate();
    }
}

const fn ring_full(write_index: i64, read_index: i64, capacity: i64) -> bool {
    write_index - read_index >= capacity
}

/// Computes the `COMPUTE_TMPRING_SIZE` value for a freshly (re)acquired
/// scratch backing allocation of `size` bytes. Returns 0 when there's no
/// scratch to describe, matching the "disabled" encoding the CP expects.
fn scratch_tmpring_size(request: &ScratchRequest, size: u64) -> u32 {
    if size == 0 {
        return 0;
    }
    let wavesize_kib = div_ceil_u64(
        u64::from(request.lanes_per_wave) * u64::from(request.size_per_thread),
        1024,
    );
    let wave_bytes = (wavesize_kib * 1024).max(1);
    let waves = (size / wave_bytes).min(u64::from(request.max_scratch_slots));
    srd::tmpring_size(waves as u32, wavesize_kib as u32)
}

const fn div_ceil_u64(a: u64, b: u64) -> u64 {
    if b == 0 { 0 } else { (a + b - 1) / b }
}

/// Packs the PM4 payload for [`AqlQueue::execute_pm4`] into a 16-dword slot,
/// with the publishing dword (index 0) left for the caller to write last.
fn build_pm4_slot(isa_major: u32, ib_va: u64, ib_dwords: u32) -> [u32; 16] {
    let mut words = [0u32; 16];
    let mut jump = [0u32; 4];
    packets::write_indirect_buffer_jump(&mut jump, ib_va, ib_dwords);

    if isa_major >= 9 {
        words[1] = packets::AQL_VENDOR_SUBTYPE_PM4_IB;
        words[2] = packets::PM4_IB_DW_CNT_REMAIN;
        words[3..7].copy_from_slice(&jump);
        words[0] = u32::from(packets::make_header(
            packets::AQL_PACKET_TYPE_VENDOR_SPECIFIC,
            false,
            packets::AQL_FENCE_SCOPE_NONE,
            packets::AQL_FENCE_SCOPE_SYSTEM,
        ));
    } else {
        let release_mem = packets::release_mem_packet();
        words[1..5].copy_from_slice(&jump);
        words[10..16].copy_from_slice(&release_mem);
        words[0] = packets::pm4_header(packets::PM4_IT_OPCODE_NOP, 14);
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_full_detects_saturation() {
        assert!(!ring_full(10, 0, 16));
        assert!(ring_full(16, 0, 16));
        assert!(ring_full(20, 0, 16));
    }

    #[test]
    fn queue_properties_bits_are_distinct() {
        assert_ne!(QUEUE_PROP_IS_PTR64, QUEUE_PROP_USE_SCRATCH_ONCE);
        assert_eq!(QUEUE_PROP_IS_PTR64 & QUEUE_PROP_USE_SCRATCH_ONCE, 0);
    }

    #[test]
    fn scratch_state_default_has_no_backing_memory() {
        let state = ScratchState::default();
        assert_eq!(state.backing_memory_location, 0);
        assert_eq!(state.backing_memory_byte_size, 0);
        assert_eq!(state.wave64_lane_byte_size, 0);
        assert!(state.allocation.is_none());
    }

    #[test]
    fn tmpring_size_is_zero_for_empty_allocation() {
        let req = ScratchRequest {
            lanes_per_wave: 64,
            size_per_thread: 256,
            max_scratch_slots: 1024,
            ..Default::default()
        };
        assert_eq!(scratch_tmpring_size(&req, 0), 0);
    }

    #[test]
    fn tmpring_size_clamps_waves_to_max_scratch_slots() {
        let req = ScratchRequest {
            lanes_per_wave: 64,
            size_per_thread: 256,
            max_scratch_slots: 4,
            ..Default::default()
        };
        // size backs far more wave-slots than max_scratch_slots allows.
        let reg = scratch_tmpring_size(&req, 1 << 30);
        assert_eq!(reg & 0xFFF, 4);
    }

    #[test]
    fn pm4_slot_differs_by_isa_generation() {
        let legacy = build_pm4_slot(8, 0x1000, 16);
        let modern = build_pm4_slot(9, 0x1000, 16);
        assert_ne!(legacy[0], modern[0]);
        // Both carry the same indirect-buffer jump payload, just at
        // different offsets within the slot.
        assert_eq!(legacy[1], modern[3]);
    }

    #[test]
    fn pm4_slot_publishes_release_mem_last_for_legacy_isa() {
        let slot = build_pm4_slot(7, 0x2000, 4);
        assert_eq!(slot[10] >> 24 & 0xFF, packets::PM4_IT_OPCODE_RELEASE_MEM);
    }

    #[test]
    fn modern_isa_carries_fixed_dw_cnt_remain() {
        let slot = build_pm4_slot(10, 0x3000, 8);
        assert_eq!(slot[1], packets::AQL_VENDOR_SUBTYPE_PM4_IB);
        assert_eq!(slot[2], packets::PM4_IB_DW_CNT_REMAIN);
    }
}
