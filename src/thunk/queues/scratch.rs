//! Dynamic (private-segment) scratch fault handling.
//!
//! When a dispatch needs more private memory than is currently backing a
//! queue, the command processor raises an inactive-signal fault instead of
//! failing the wave. The handler decodes the fault's error code, works out
//! how much scratch the offending dispatch actually needs, grows the
//! backing allocation, rebuilds the SRD, and lets the dispatch retry.

use super::packets::KernelDispatchPacket;

/// `error_code` bit indicating the dispatch wants 32-lane (wave32) waves
/// rather than the 64-lane default.
pub const ERROR_CODE_WAVE32_BIT: u32 = 0x400;
/// Insufficient-scratch fault: more private memory is needed than currently
/// backs the queue.
pub const ERROR_CODE_INSUFFICIENT_SCRATCH_MASK: u32 = 0x401;
/// Large-scratch-reclaim fault: the kernel is asking the runtime to release
/// an over-large scratch allocation back to the system.
pub const ERROR_CODE_LARGE_SCRATCH_RECLAIM: u32 = 512;

#[must_use]
pub const fn is_insufficient_scratch(error_code: u32) -> bool {
    error_code & ERROR_CODE_INSUFFICIENT_SCRATCH_MASK == ERROR_CODE_INSUFFICIENT_SCRATCH_MASK
}

#[must_use]
pub const fn is_large_scratch_reclaim(error_code: u32) -> bool {
    error_code == ERROR_CODE_LARGE_SCRATCH_RECLAIM
}

/// What a dispatch actually needs from the scratch aperture, computed from
/// the faulting packet and the node's physical CU/slot layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScratchRequest {
    pub lanes_per_wave: u32,
    pub size_per_thread: u32,
    pub max_scratch_slots: u32,
    pub waves_per_group: u32,
    pub wanted_slots: u32,
    /// Bytes needed to satisfy just this dispatch.
    pub dispatch_size: u64,
    /// Bytes needed if every physical scratch slot were in use at once —
    /// the upper bound the queue's backing allocation should never exceed.
    pub max_size: u64,
}

const fn align_up(v: u32, align: u32) -> u32 {
    if align == 0 {
        v
    } else {
        (v + align - 1) & !(align - 1)
    }
}

fn div_ceil_u32(a: u32, b: u32) -> u32 {
    if b == 0 { 0 } else { a.div_ceil(b) }
}

/// Computes the scratch this faulting dispatch requires.
///
/// `max_cu_id` is the highest physical CU index on the node, `max_slots_scratch_cu`
/// the number of scratch wave-slots per CU, and `num_shader_banks` the shader
/// engine count used to round the group count up to a full wavefront of banks.
#[must_use]
pub fn compute_request(
    error_code: u32,
    packet: &KernelDispatchPacket,
    max_cu_id: u32,
    max_slots_scratch_cu: u32,
    num_shader_banks: u32,
) -> ScratchRequest {
    let lanes_per_wave = if error_code & ERROR_CODE_WAVE32_BIT != 0 { 32 } else { 64 };
    let bytes_per_wave_quantum = 1024 / lanes_per_wave;
    let size_per_thread = align_up(packet.private_segment_size, bytes_per_wave_quantum);

    let max_scratch_slots = (max_cu_id + 1) * max_slots_scratch_cu;
    let max_size = u64::from(size_per_thread) * u64::from(max_scratch_slots) * u64::from(lanes_per_wave);

    let wg_threads =
        u32::from(packet.workgroup_size_x) * u32::from(packet.workgroup_size_y) * u32::from(packet.workgroup_size_z);
    let waves_per_group = div_ceil_u32(wg_threads.max(1), lanes_per_wave);

    let groups_x = div_ceil_u32(packet.grid_size_x, u32::from(packet.workgroup_size_x).max(1));
    let groups_y = div_ceil_u32(packet.grid_size_y, u32::from(packet.workgroup_size_y).max(1));
    let groups_z = div_ceil_u32(packet.grid_size_z, u32::from(packet.workgroup_size_z).max(1));
    let mut groups = groups_x.saturating_mul(groups_y).saturating_mul(groups_z);
    if num_shader_banks > 0 {
        groups = div_ceil_u32(groups, num_shader_banks).saturating_mul(num_shader_banks);
    }

    let wanted_slots = groups.saturating_mul(waves_per_group).min(max_scratch_slots);
    let dispatch_size = u64::from(size_per_thread) * u64::from(wanted_slots) * u64::from(lanes_per_wave);

    ScratchRequest {
        lanes_per_wave,
        size_per_thread,
        max_scratch_slots,
        waves_per_group,
        wanted_slots,
        dispatch_size,
        max_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(private_segment_size: u32, wg: (u16, u16, u16), grid: (u32, u32, u32)) -> KernelDispatchPacket {
        KernelDispatchPacket {
            header: 0,
            setup: 0,
            workgroup_size_x: wg.0,
            workgroup_size_y: wg.1,
            workgroup_size_z: wg.2,
            reserved0: 0,
            grid_size_x: grid.0,
            grid_size_y: grid.1,
            grid_size_z: grid.2,
            private_segment_size,
            group_segment_size: 0,
            kernel_object: 0,
            kernarg_address: 0,
            reserved2: 0,
            completion_signal: 0,
        }
    }

    #[test]
    fn wave32_bit_halves_lane_count() {
        let p = packet(16, (64, 1, 1), (64, 1, 1));
        let req = compute_request(ERROR_CODE_INSUFFICIENT_SCRATCH_MASK, &p, 59, 32, 4);
        assert_eq!(req.lanes_per_wave, 64);
        let req32 = compute_request(ERROR_CODE_INSUFFICIENT_SCRATCH_MASK | ERROR_CODE_WAVE32_BIT, &p, 59, 32, 4);
        assert_eq!(req32.lanes_per_wave, 32);
    }

    #[test]
    fn dispatch_size_never_exceeds_max_size() {
        let p = packet(256, (256, 1, 1), (4096, 1, 1));
        let req = compute_request(ERROR_CODE_INSUFFICIENT_SCRATCH_MASK, &p, 59, 32, 4);
        assert!(req.dispatch_size <= req.max_size);
    }

    #[test]
    fn fault_code_classification() {
        assert!(is_insufficient_scratch(0x401));
        assert!(!is_insufficient_scratch(0x400));
        assert!(is_large_scratch_reclaim(512));
        assert!(!is_large_scratch_reclaim(513));
    }
}
