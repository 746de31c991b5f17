//! MMIO doorbell submission.
//!
//! Ringing a doorbell tells the command processor "packets up to this write
//! index are ready." Three wire formats exist depending on engine generation;
//! picking the wrong one silently drops dispatches, so the variant is derived
//! from the agent's engine ID rather than left to the caller.

use std::sync::atomic::{fence, AtomicBool, AtomicI64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorbellVariant {
    /// GFX9+: a single 64-bit release-store of the write index.
    NativeAql,
    /// GFX8 SOC15 transitional hardware: 64-bit write, but clamped to
    /// `[read_index, read_index + ring_size]` and monotonic under a lock.
    Legacy64,
    /// GFX7 and older: a 32-bit dword *offset* into the ring, not the raw
    /// index, likewise clamped and monotonic.
    LegacyGfx7Dw,
}

impl DoorbellVariant {
    #[must_use]
    pub const fn for_engine(major: u32, _minor: u32) -> Self {
        if major >= 9 {
            Self::NativeAql
        } else if major == 8 {
            Self::Legacy64
        } else {
            Self::LegacyGfx7Dw
        }
    }
}

/// Drives a single queue's MMIO doorbell register.
///
/// The pointer is owned by the queue's allocation (mapped via
/// `MemoryManager::map_doorbell`); this type only knows how to write to it.
pub struct DoorbellDriver {
    ptr: *mut u32,
    variant: DoorbellVariant,
    ring_size: u64,
    packet_dwords: u64,
    legacy_workaround: bool,
    lock: AtomicBool,
    max_dispatch_id_plus_one: AtomicI64,
}

unsafe impl Send for DoorbellDriver {}
unsafe impl Sync for DoorbellDriver {}

impl DoorbellDriver {
    #[must_use]
    pub fn new(ptr: *mut u32, variant: DoorbellVariant, ring_size: u64, legacy_workaround: bool) -> Self {
        Self {
            ptr,
            variant,
            ring_size,
            packet_dwords: 64 / 4,
            legacy_workaround,
            lock: AtomicBool::new(false),
            max_dispatch_id_plus_one: AtomicI64::new(0),
        }
    }

    /// Rings the doorbell to announce packets are enqueued up to
    /// `write_index`, given the last observed `read_index`.
    pub fn ring(&self, write_index: i64, read_index: i64) {
        match self.variant {
            DoorbellVariant::NativeAql => self.ring_native(write_index),
            DoorbellVariant::Legacy64 => self.ring_legacy(write_index, read_index, false),
            DoorbellVariant::LegacyGfx7Dw => self.ring_legacy(write_index, read_index, true),
        }
    }

    fn ring_native(&self, write_index: i64) {
        fence(Ordering::Release);
        unsafe {
            self.ptr.cast::<u64>().write_volatile(write_index as u64);
        }
    }

    fn ring_legacy(&self, write_index: i64, read_index: i64, as_dword_offset: bool) {
        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }

        let clamped = write_index.min(read_index + self.ring_size as i64);
        let prev = self.max_dispatch_id_plus_one.load(Ordering::Relaxed);

        if clamped > prev {
            self.max_dispatch_id_plus_one.store(clamped, Ordering::Relaxed);

            let payload = if as_dword_offset {
                let ring_mask = if self.legacy_workaround {
                    2 * self.ring_size - 1
                } else {
                    self.ring_size - 1
                };
                ((clamped as u64) & ring_mask) * self.packet_dwords
            } else {
                clamped as u64
            };

            fence(Ordering::Release);
            unsafe {
                self.ptr.write_volatile(payload as u32);
            }
        }

        self.lock.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_selection_follows_engine_generation() {
        assert_eq!(DoorbellVariant::for_engine(10, 0), DoorbellVariant::NativeAql);
        assert_eq!(DoorbellVariant::for_engine(9, 0), DoorbellVariant::NativeAql);
        assert_eq!(DoorbellVariant::for_engine(8, 0), DoorbellVariant::Legacy64);
        assert_eq!(DoorbellVariant::for_engine(7, 0), DoorbellVariant::LegacyGfx7Dw);
    }

    #[test]
    fn legacy_ring_drops_backward_writes() {
        let mut slot: u64 = 0;
        let driver = DoorbellDriver::new(std::ptr::addr_of_mut!(slot).cast(), DoorbellVariant::Legacy64, 64, false);
        driver.ring(10, 0);
        assert_eq!(slot, 10);
        driver.ring(5, 0); // stale/out-of-order write index, must not regress the register
        assert_eq!(slot, 10);
        driver.ring(20, 0);
        assert_eq!(slot, 20);
    }

    #[test]
    fn gfx7_ring_writes_dword_offset_not_raw_index() {
        let mut slot: u32 = 0;
        let driver = DoorbellDriver::new(std::ptr::addr_of_mut!(slot), DoorbellVariant::LegacyGfx7Dw, 64, false);
        driver.ring(3, 0);
        assert_eq!(slot, 3 * 16); // index 3 * 16 dwords/packet
    }
}
