//! Ring buffer allocation for the AQL queue's producer-facing packet array.
//!
//! Modern GPUs map a single contiguous buffer and let the command processor
//! wrap the read/write pointers with a power-of-two mask. GFX7/8 hardware
//! cannot wrap a dispatch across the end of a single mapping mid-packet, so
//! older thunks double-map the same physical pages back to back and let the
//! ring "wrap" into the second copy instead — the approach mirrored here.

use crate::error::{HsaError, HsaResult};
use crate::kfd::sysfs::HsaNodeProperties;
use crate::thunk::queues::packets::AQL_PACKET_TYPE_INVALID;
use std::ptr;

pub const AQL_PACKET_SIZE: usize = 64;
const MIN_RING_BYTES: usize = 1024;
const MAX_RING_BYTES: usize = 1usize << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingLayout {
    /// One mapping; the command processor wraps the index itself.
    Single,
    /// Two adjacent mappings of the same memfd (GFX7/8 wraparound workaround).
    DoubleMapped,
}

/// Owns the mmap'd backing store for a queue's AQL ring and unmaps it on drop.
#[derive(Debug)]
pub struct RingAllocation {
    base: *mut u8,
    bytes_per_copy: usize,
    layout: RingLayout,
}

unsafe impl Send for RingAllocation {}
unsafe impl Sync for RingAllocation {}

impl RingAllocation {
    #[must_use]
    pub const fn base_ptr(&self) -> *mut u8 {
        self.base
    }

    #[must_use]
    pub const fn bytes_per_copy(&self) -> usize {
        self.bytes_per_copy
    }

    #[must_use]
    pub const fn packet_count(&self) -> u64 {
        (self.bytes_per_copy / AQL_PACKET_SIZE) as u64
    }

    /// Address of packet slot `index`, wrapped into `[0, packet_count)`.
    #[must_use]
    pub fn slot(&self, index: u64) -> *mut u8 {
        let mask = self.packet_count() - 1;
        unsafe { self.base.add(((index & mask) as usize) * AQL_PACKET_SIZE) }
    }

    /// Stamps every slot's packet header with `INVALID` (type bits = 1).
    /// A zero-filled page encodes `VENDOR_SPECIFIC` (type 0), which a
    /// consumer would treat as a real packet rather than an empty slot.
    fn mark_all_invalid(&self) {
        for i in 0..self.packet_count() {
            unsafe {
                self.slot(i).cast::<u16>().write_volatile(AQL_PACKET_TYPE_INVALID);
            }
        }
    }
}

impl Drop for RingAllocation {
    fn drop(&mut self) {
        let total = match self.layout {
            RingLayout::Single => self.bytes_per_copy,
            RingLayout::DoubleMapped => self.bytes_per_copy * 2,
        };
        if !self.base.is_null() {
            unsafe {
                libc::munmap(self.base.cast(), total);
            }
        }
    }
}

/// GFX 7.x and pre-GFX8.0.3 integrated parts cannot execute out of a ring
/// mapped `PROT_EXEC`, and require the double-map wraparound workaround.
#[must_use]
pub fn requires_legacy_workaround(props: &HsaNodeProperties) -> bool {
    let major = (props.gfx_target_version / 10000) % 100;
    let minor = (props.gfx_target_version / 100) % 100;
    major < 8 || (major == 8 && minor == 0 && props.gfx_target_version < 80003)
}

fn validate_packet_count(requested: u32, legacy_workaround: bool) -> HsaResult<u32> {
    if requested == 0 || !requested.is_power_of_two() {
        return Err(HsaError::General(format!(
            "ring packet count {requested} must be a non-zero power of two"
        )));
    }
    let bytes = requested as usize * AQL_PACKET_SIZE;
    let max_bytes = if legacy_workaround { MAX_RING_BYTES / 2 } else { MAX_RING_BYTES };
    if bytes < MIN_RING_BYTES || bytes > max_bytes {
        return Err(HsaError::General(format!(
            "ring size {requested} packets ({bytes} bytes) outside [{}, {}] bytes",
            MIN_RING_BYTES, max_bytes
        )));
    }
    Ok(requested)
}

/// Allocates the CPU-resident ring backing store for `packet_count` AQL
/// packets. `legacy_workaround` selects the GFX7/8 double-map layout.
///
/// # Errors
/// Returns an error if `packet_count` fails validation or the underlying
/// `mmap`/`memfd_create` calls fail.
pub fn allocate_ring(packet_count: u32, legacy_workaround: bool) -> HsaResult<RingAllocation> {
    let packet_count = validate_packet_count(packet_count, legacy_workaround)?;
    let bytes = packet_count as usize * AQL_PACKET_SIZE;

    if !legacy_workaround {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(HsaError::Io(std::io::Error::last_os_error()));
        }
        unsafe {
            ptr::write_bytes(ptr.cast::<u8>(), 0, bytes);
        }
        let ring = RingAllocation {
            base: ptr.cast(),
            bytes_per_copy: bytes,
            layout: RingLayout::Single,
        };
        ring.mark_all_invalid();
        return Ok(ring);
    }

    let name = std::ffi::CString::new(format!("hsa-ring-{}", std::process::id())).unwrap();
    let fd = unsafe { libc::memfd_create(name.as_ptr(), 0) };
    if fd < 0 {
        return Err(HsaError::Io(std::io::Error::last_os_error()));
    }

    let setup = (|| -> HsaResult<*mut u8> {
        if unsafe { libc::ftruncate(fd, bytes as libc::off_t) } != 0 {
            return Err(HsaError::Io(std::io::Error::last_os_error()));
        }

        let reserve = unsafe {
            libc::mmap(
                ptr::null_mut(),
                bytes * 2,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if reserve == libc::MAP_FAILED {
            return Err(HsaError::Io(std::io::Error::last_os_error()));
        }

        for offset in [0usize, bytes] {
            let target = unsafe { reserve.cast::<u8>().add(offset) };
            let mapped = unsafe {
                libc::mmap(
                    target.cast(),
                    bytes,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    fd,
                    0,
                )
            };
            if mapped == libc::MAP_FAILED {
                unsafe {
                    libc::munmap(reserve, bytes * 2);
                }
                return Err(HsaError::Io(std::io::Error::last_os_error()));
            }
        }

        unsafe {
            ptr::write_bytes(reserve.cast::<u8>(), 0, bytes);
        }
        Ok(reserve.cast())
    })();

    unsafe {
        libc::close(fd);
    }

    let base = setup?;
    let ring = RingAllocation {
        base,
        bytes_per_copy: bytes,
        layout: RingLayout::DoubleMapped,
    };
    ring.mark_all_invalid();
    Ok(ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        assert!(validate_packet_count(100, false).is_err());
        assert!(validate_packet_count(128, false).is_ok());
    }

    #[test]
    fn legacy_workaround_halves_max_size() {
        let big = (MAX_RING_BYTES / AQL_PACKET_SIZE) as u32;
        assert!(validate_packet_count(big, false).is_ok());
        assert!(validate_packet_count(big, true).is_err());
    }

    #[test]
    fn single_mapping_ring_round_trips_writes() {
        let ring = allocate_ring(16, false).unwrap();
        assert_eq!(ring.packet_count(), 16);
        unsafe {
            ring.slot(0).write_bytes(0xAB, 64);
            assert_eq!(*ring.slot(16), 0xAB); // wraps to slot 0
        }
    }

    #[test]
    fn double_mapped_ring_shares_backing_pages() {
        let ring = allocate_ring(16, true).unwrap();
        unsafe {
            ring.base_ptr().write_bytes(0x42, 1);
            // The second copy is a distinct mapping of the same physical page.
            assert_eq!(*ring.base_ptr().add(ring.bytes_per_copy()), 0x42);
        }
    }

    #[test]
    fn fresh_ring_slots_carry_invalid_header_not_zero() {
        let ring = allocate_ring(16, false).unwrap();
        for i in 0..ring.packet_count() {
            let header = unsafe { ring.slot(i).cast::<u16>().read() };
            assert_eq!(header, AQL_PACKET_TYPE_INVALID);
        }
    }
}
