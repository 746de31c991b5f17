//! AQL packet layout and the PM4 indirect-buffer helpers used to inject
//! vendor packets into a queue's ring for [`super::cu_mask::CuMaskState`]'s
//! `execute_pm4` path.

/// AQL packet type field values (`header` bits [7:0]).
pub const AQL_PACKET_TYPE_VENDOR_SPECIFIC: u16 = 0;
pub const AQL_PACKET_TYPE_INVALID: u16 = 1;
pub const AQL_PACKET_TYPE_KERNEL_DISPATCH: u16 = 2;
pub const AQL_PACKET_TYPE_BARRIER_AND: u16 = 3;
pub const AQL_PACKET_TYPE_AGENT_DISPATCH: u16 = 4;
pub const AQL_PACKET_TYPE_BARRIER_OR: u16 = 5;

pub const AQL_FENCE_SCOPE_NONE: u16 = 0;
pub const AQL_FENCE_SCOPE_AGENT: u16 = 1;
pub const AQL_FENCE_SCOPE_SYSTEM: u16 = 2;

/// Builds an AQL packet header: type in bits [7:0], barrier bit at [8],
/// acquire fence scope at [10:9], release fence scope at [12:11].
#[must_use]
pub const fn make_header(packet_type: u16, barrier: bool, acquire_scope: u16, release_scope: u16) -> u16 {
    packet_type | ((barrier as u16) << 8) | (acquire_scope << 9) | (release_scope << 11)
}

#[must_use]
pub const fn packet_type(header: u16) -> u16 {
    header & 0xff
}

/// Returns `header` with its release-fence scope bits [12:11] replaced by
/// `scope`, leaving the packet type and barrier/acquire bits untouched.
#[must_use]
pub const fn with_release_scope(header: u16, scope: u16) -> u16 {
    (header & !(0b11 << 11)) | ((scope & 0b11) << 11)
}

/// A 64-byte AQL kernel dispatch packet, the producer-facing unit of work.
/// Field layout matches the HSA standard queue packet ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KernelDispatchPacket {
    pub header: u16,
    pub setup: u16,
    pub workgroup_size_x: u16,
    pub workgroup_size_y: u16,
    pub workgroup_size_z: u16,
    pub reserved0: u16,
    pub grid_size_x: u32,
    pub grid_size_y: u32,
    pub grid_size_z: u32,
    pub private_segment_size: u32,
    pub group_segment_size: u32,
    pub kernel_object: u64,
    pub kernarg_address: u64,
    pub reserved2: u64,
    pub completion_signal: u64,
}

const _: () = assert!(std::mem::size_of::<KernelDispatchPacket>() == 64);

impl KernelDispatchPacket {
    /// Reinterprets a raw 64-byte ring slot as a dispatch packet.
    ///
    /// # Safety
    /// `slot` must point to a live, correctly aligned 64-byte AQL packet.
    #[must_use]
    pub unsafe fn from_slot(slot: *const u8) -> Self {
        unsafe { slot.cast::<Self>().read_volatile() }
    }
}

/// A raw, opaque 64-byte ring slot, used when a packet's contents don't need
/// to be interpreted (barrier packets, vendor packets carrying PM4).
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy)]
pub struct AqlSlot {
    pub bytes: [u8; 64],
}

const _: () = assert!(std::mem::size_of::<AqlSlot>() == 64);

pub const PM4_TYPE3: u32 = 3 << 30;
pub const PM4_IT_OPCODE_INDIRECT_BUFFER: u32 = 0x3F;
pub const PM4_IT_OPCODE_NOP: u32 = 0x10;
pub const PM4_IT_OPCODE_RELEASE_MEM: u32 = 0x49;

/// Identifies the PM4-carrying payload of a vendor-specific AQL packet on
/// ISA >= 10, where the command processor reads raw PM4 directly out of the
/// AQL ring instead of needing the legacy indirect-buffer splice.
pub const AQL_VENDOR_SUBTYPE_PM4_IB: u32 = 1;
/// Fixed `dw_cnt_remain` the CP expects for the PM4-IB vendor subtype.
pub const PM4_IB_DW_CNT_REMAIN: u32 = 0xA;

/// Writes a minimal 6-dword `RELEASE_MEM` packet: an end-of-pipe fence with
/// no interrupt or memory write side effects beyond marking completion.
#[must_use]
pub const fn release_mem_packet() -> [u32; 6] {
    [
        pm4_header(PM4_IT_OPCODE_RELEASE_MEM, 5),
        0, // EVENT_CNTL
        0, // ADDRESS_LO
        0, // ADDRESS_HI
        0, // DATA_LO
        0, // DATA_HI
    ]
}

#[must_use]
pub const fn pm4_header(opcode: u32, count_minus_one: u32) -> u32 {
    PM4_TYPE3 | ((count_minus_one & 0x3FFF) << 16) | ((opcode & 0xFF) << 8)
}

/// Writes a 4-dword `INDIRECT_BUFFER` packet into `out`, pointing the command
/// processor at `ib_va` for `ib_dwords` dwords. This is what a vendor-specific
/// AQL packet's payload carries to splice raw PM4 into a compute queue.
pub fn write_indirect_buffer_jump(out: &mut [u32; 4], ib_va: u64, ib_dwords: u32) {
    out[0] = pm4_header(PM4_IT_OPCODE_INDIRECT_BUFFER, 2);
    out[1] = (ib_va & 0xFFFF_FFFC) as u32;
    out[2] = ((ib_va >> 32) & 0xFFFF) as u32;
    out[3] = ib_dwords & 0x000F_FFFF;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_scope_patch_preserves_type_and_barrier_bits() {
        let header = make_header(AQL_PACKET_TYPE_KERNEL_DISPATCH, true, AQL_FENCE_SCOPE_AGENT, AQL_FENCE_SCOPE_NONE);
        let patched = with_release_scope(header, AQL_FENCE_SCOPE_SYSTEM);
        assert_eq!(packet_type(patched), AQL_PACKET_TYPE_KERNEL_DISPATCH);
        assert_eq!((patched >> 8) & 1, 1); // barrier bit untouched
        assert_eq!((patched >> 9) & 0b11, AQL_FENCE_SCOPE_AGENT); // acquire scope untouched
        assert_eq!((patched >> 11) & 0b11, AQL_FENCE_SCOPE_SYSTEM);
    }
}
