//! Decodes the hardware/memory exception payload carried by a queue's
//! exception event into the error taxonomy the public API exposes.
//!
//! KFD reports VM faults and hardware exceptions through the same event
//! mechanism as scratch faults; this module is purely the decode step. The
//! dispatch (waiting on the exception signal, invoking the registered
//! callback) is handled by [`super::queue::AqlQueue`].

use crate::error::QueueErrorKind;
use crate::kfd::ioctl::{HsaHwExceptionData, HsaMemoryExceptionData};

/// Classifies a VM memory fault by which permission bit it violated.
#[must_use]
pub fn classify_memory_fault(data: &HsaMemoryExceptionData) -> QueueErrorKind {
    if data.failure.not_present != 0 {
        QueueErrorKind::MemoryApertureViolation
    } else if data.failure.no_execute != 0 {
        QueueErrorKind::IllegalInstruction
    } else if data.failure.read_only != 0 {
        QueueErrorKind::MemoryFault
    } else {
        QueueErrorKind::Exception
    }
}

/// Classifies a hardware exception (GPU reset, ECC event, etc.) reported
/// against this queue's node.
#[must_use]
pub fn classify_hw_exception(data: &HsaHwExceptionData) -> QueueErrorKind {
    if data.memory_lost != 0 {
        QueueErrorKind::MemoryFault
    } else {
        QueueErrorKind::Exception
    }
}

// Bit positions used by the inactive-signal's raw 32-bit error code once the
// scratch-fault codes (`super::scratch::ERROR_CODE_*`) have been ruled out.
// Values are the literal bit assignments from the dispatch-validation error
// table (spec §4.4 step 5), not a renumbering — the GPU posts these exact
// bits.
const BIT_INCOMPATIBLE_ARGUMENTS: u32 = 1 << 1; // 2: invalid dim
const BIT_INVALID_ALLOCATION: u32 = 1 << 2; // 4: invalid group memory
const BIT_INVALID_CODE_OBJECT: u32 = 1 << 3; // 8
const BIT_INVALID_PACKET_FORMAT_GENERIC: u32 = 1 << 5; // 32
const BIT_INVALID_ARGUMENT: u32 = 1 << 6; // 64: group too large
const BIT_INVALID_ISA: u32 = 1 << 7; // 128: VGPR exhausted
const BIT_INVALID_PACKET_FORMAT_VENDOR: u32 = 1 << 8; // 256
const BIT_MEMORY_APERTURE_VIOLATION: u32 = 1 << 29; // 0x2000_0000: >48-bit
const BIT_ILLEGAL_INSTRUCTION: u32 = 1 << 30; // 0x4000_0000
const BIT_EXCEPTION: u32 = 1 << 31; // 0x8000_0000: debug trap

/// Decodes the inactive signal's raw error code once the scratch-fault bits
/// have already been handled by [`super::scratch::is_insufficient_scratch`]
/// and [`super::scratch::is_large_scratch_reclaim`].
#[must_use]
pub const fn classify_inactive_bitmask(error_code: u32) -> QueueErrorKind {
    if error_code & BIT_EXCEPTION != 0 {
        QueueErrorKind::Exception
    } else if error_code & BIT_ILLEGAL_INSTRUCTION != 0 {
        QueueErrorKind::IllegalInstruction
    } else if error_code & BIT_MEMORY_APERTURE_VIOLATION != 0 {
        QueueErrorKind::MemoryApertureViolation
    } else if error_code & BIT_INVALID_ISA != 0 {
        QueueErrorKind::InvalidIsa
    } else if error_code & BIT_INVALID_ARGUMENT != 0 {
        QueueErrorKind::InvalidArgument
    } else if error_code & (BIT_INVALID_PACKET_FORMAT_GENERIC | BIT_INVALID_PACKET_FORMAT_VENDOR) != 0 {
        QueueErrorKind::InvalidPacketFormat
    } else if error_code & BIT_INVALID_CODE_OBJECT != 0 {
        QueueErrorKind::InvalidCodeObject
    } else if error_code & BIT_INVALID_ALLOCATION != 0 {
        QueueErrorKind::InvalidAllocation
    } else if error_code & BIT_INCOMPATIBLE_ARGUMENTS != 0 {
        QueueErrorKind::IncompatibleArguments
    } else {
        QueueErrorKind::Error
    }
}

// Bit positions for the dedicated exception-signal channel (`EC_*` in the
// vendor ABI this mirrors, bit index is the enumerator value minus one).
const EC_WAVE_ABORT: u32 = 1 << 0;
const EC_WAVE_TRAP: u32 = 1 << 1;
const EC_WAVE_MATH_ERROR: u32 = 1 << 2;
const EC_WAVE_ILLEGAL_INSTRUCTION: u32 = 1 << 3;
const EC_WAVE_MEMORY_VIOLATION: u32 = 1 << 4;
const EC_WAVE_APERTURE_VIOLATION: u32 = 1 << 5;
const EC_PACKET_DISPATCH_INVALID: u32 = 1 << 6;
const EC_PACKET_RESERVED_BIT: u32 = 1 << 7;
const EC_PREEMPTION_ERROR: u32 = 1 << 8;
const EC_DEVICE_MEMORY_VIOLATION: u32 = 1 << 9;
const EC_DEVICE_RAS_ERROR: u32 = 1 << 10;
const EC_DEVICE_FATAL_HALT: u32 = 1 << 11;
const EC_DEVICE_HOTPLUG: u32 = 1 << 12;

/// Decodes the dedicated exception signal's raw payload, mirroring the
/// dispatch-validation classes of [`classify_inactive_bitmask`] plus the
/// wave-trap and device-level classes that only arrive on this channel.
#[must_use]
pub const fn classify_exception_bitmask(data: u32) -> QueueErrorKind {
    if data & (EC_DEVICE_RAS_ERROR | EC_DEVICE_FATAL_HALT | EC_DEVICE_HOTPLUG | EC_PREEMPTION_ERROR) != 0 {
        QueueErrorKind::Error
    } else if data & (EC_DEVICE_MEMORY_VIOLATION | EC_WAVE_MEMORY_VIOLATION) != 0 {
        QueueErrorKind::MemoryFault
    } else if data & EC_WAVE_APERTURE_VIOLATION != 0 {
        QueueErrorKind::MemoryApertureViolation
    } else if data & EC_WAVE_ILLEGAL_INSTRUCTION != 0 {
        QueueErrorKind::IllegalInstruction
    } else if data & (EC_PACKET_DISPATCH_INVALID | EC_PACKET_RESERVED_BIT) != 0 {
        QueueErrorKind::InvalidPacketFormat
    } else if data & (EC_WAVE_ABORT | EC_WAVE_TRAP | EC_WAVE_MATH_ERROR) != 0 {
        QueueErrorKind::Exception
    } else {
        QueueErrorKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfd::ioctl::MemoryExceptionFailure;

    fn exc(not_present: u32, read_only: u32, no_execute: u32) -> HsaMemoryExceptionData {
        HsaMemoryExceptionData {
            failure: MemoryExceptionFailure {
                not_present,
                read_only,
                no_execute,
                imprecise: 0,
            },
            va: 0,
            gpu_id: 0,
            error_type: 0,
        }
    }

    #[test]
    fn not_present_maps_to_aperture_violation() {
        assert_eq!(
            classify_memory_fault(&exc(1, 0, 0)),
            QueueErrorKind::MemoryApertureViolation
        );
    }

    #[test]
    fn no_execute_maps_to_illegal_instruction() {
        assert_eq!(classify_memory_fault(&exc(0, 0, 1)), QueueErrorKind::IllegalInstruction);
    }

    #[test]
    fn read_only_violation_maps_to_memory_fault() {
        assert_eq!(classify_memory_fault(&exc(0, 1, 0)), QueueErrorKind::MemoryFault);
    }

    #[test]
    fn hw_exception_with_memory_loss_maps_to_memory_fault() {
        let data = HsaHwExceptionData {
            reset_type: 1,
            reset_cause: 0,
            memory_lost: 1,
            gpu_id: 0,
        };
        assert_eq!(classify_hw_exception(&data), QueueErrorKind::MemoryFault);
    }

    #[test]
    fn inactive_bitmask_prefers_most_specific_bit() {
        assert_eq!(
            classify_inactive_bitmask(BIT_INCOMPATIBLE_ARGUMENTS),
            QueueErrorKind::IncompatibleArguments
        );
        assert_eq!(classify_inactive_bitmask(BIT_INVALID_ALLOCATION), QueueErrorKind::InvalidAllocation);
        assert_eq!(
            classify_inactive_bitmask(BIT_EXCEPTION | BIT_INCOMPATIBLE_ARGUMENTS),
            QueueErrorKind::Exception
        );
        assert_eq!(classify_inactive_bitmask(0), QueueErrorKind::Error);
    }

    #[test]
    fn inactive_bitmask_matches_literal_spec_values() {
        assert_eq!(classify_inactive_bitmask(2), QueueErrorKind::IncompatibleArguments);
        assert_eq!(classify_inactive_bitmask(4), QueueErrorKind::InvalidAllocation);
        assert_eq!(classify_inactive_bitmask(8), QueueErrorKind::InvalidCodeObject);
        assert_eq!(classify_inactive_bitmask(32), QueueErrorKind::InvalidPacketFormat);
        assert_eq!(classify_inactive_bitmask(256), QueueErrorKind::InvalidPacketFormat);
        assert_eq!(classify_inactive_bitmask(64), QueueErrorKind::InvalidArgument);
        assert_eq!(classify_inactive_bitmask(128), QueueErrorKind::InvalidIsa);
        assert_eq!(classify_inactive_bitmask(0x2000_0000), QueueErrorKind::MemoryApertureViolation);
        assert_eq!(classify_inactive_bitmask(0x4000_0000), QueueErrorKind::IllegalInstruction);
        assert_eq!(classify_inactive_bitmask(0x8000_0000), QueueErrorKind::Exception);
    }

    #[test]
    fn exception_bitmask_prioritizes_device_fatal_classes() {
        assert_eq!(
            classify_exception_bitmask(EC_DEVICE_FATAL_HALT | EC_WAVE_TRAP),
            QueueErrorKind::Error
        );
        assert_eq!(classify_exception_bitmask(EC_WAVE_TRAP), QueueErrorKind::Exception);
        assert_eq!(
            classify_exception_bitmask(EC_WAVE_APERTURE_VIOLATION),
            QueueErrorKind::MemoryApertureViolation
        );
    }
}
