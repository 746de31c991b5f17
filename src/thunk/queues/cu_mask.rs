//! Compute unit mask management.
//!
//! A CU mask is a bitmap, one bit per physical compute unit, telling the
//! command processor which CUs a queue's waves may run on. KFD silently
//! clamps a requested mask against the node's physical CU count and any
//! process-wide global mask in effect, so callers need to be told when their
//! request didn't survive intact.

use crate::error::HsaResult;
use crate::kfd::device::KfdDevice;
use crate::kfd::ioctl::SetCuMaskArgs;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuMaskOutcome {
    Applied,
    Reduced,
}

/// Tracks the CU mask currently programmed into the KFD for one queue.
pub struct CuMaskState {
    mask: Mutex<Vec<u32>>,
    physical_words: u32,
    physical_tail_mask: u32,
}

impl CuMaskState {
    #[must_use]
    pub fn new(cu_count: u32) -> Self {
        let words = cu_count.div_ceil(32).max(1);
        let tail_bits = cu_count % 32;
        let tail_mask = if tail_bits == 0 { u32::MAX } else { (1u32 << tail_bits) - 1 };
        Self {
            mask: Mutex::new(vec![u32::MAX; words as usize]),
            physical_words: words,
            physical_tail_mask: tail_mask,
        }
    }

    /// Programs a new CU mask. An empty `requested` means "all CUs."
    ///
    /// Returns [`CuMaskOutcome::Reduced`] if bits outside the node's physical
    /// CU count, or outside `global_mask` (a process-wide restriction), were
    /// cleared to satisfy the request.
    ///
    /// # Errors
    /// Returns an error if the `SetCuMask` ioctl fails.
    pub fn set(
        &self,
        device: &KfdDevice,
        queue_id: u32,
        global_mask: Option<&[u32]>,
        requested: &[u32],
    ) -> HsaResult<CuMaskOutcome> {
        let mut words: Vec<u32> = if requested.is_empty() {
            vec![u32::MAX; self.physical_words as usize]
        } else {
            let take = requested.len().min(self.physical_words as usize);
            let mut w = requested[..take].to_vec();
            w.resize(self.physical_words as usize, 0);
            w
        };

        let mut reduced = requested.len() > self.physical_words as usize
            && requested[self.physical_words as usize..].iter().any(|&w| w != 0);

        if let Some(last) = words.last_mut() {
            let before = *last;
            *last &= self.physical_tail_mask;
            reduced |= before != *last;
        }

        if let Some(global) = global_mask {
            for (i, w) in words.iter_mut().enumerate() {
                let before = *w;
                *w &= global.get(i).copied().unwrap_or(0);
                reduced |= before != *w;
            }
        }

        let mut args = SetCuMaskArgs {
            queue_id,
            num_cu_mask: (words.len() as u32) * 32,
            cu_mask_ptr: words.as_ptr() as u64,
        };
        device.set_cu_mask(&mut args)?;

        *self.mask.lock().unwrap() = words;

        Ok(if reduced {
            CuMaskOutcome::Reduced
        } else {
            CuMaskOutcome::Applied
        })
    }

    /// Copies the currently-programmed mask into `out`, zero-extending or
    /// truncating to fit.
    pub fn get(&self, out: &mut [u32]) {
        let mask = self.mask.lock().unwrap();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = mask.get(i).copied().unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_mask_clears_nonexistent_cu_bits() {
        let state = CuMaskState::new(36); // 2 words, tail word only has 4 valid bits
        assert_eq!(state.physical_words, 2);
        assert_eq!(state.physical_tail_mask, 0xF);
    }

    #[test]
    fn reduced_flag_is_pure_of_device_io() {
        // Exercises the bit logic in isolation; no KfdDevice is constructed
        // since `set()` requires a live ioctl fd.
        let requested = vec![0xFFFF_FFFF, 0xFFFF_FFFF];
        let global = vec![0x0000_FFFF, 0xFFFF_FFFF];
        let mut words = requested.clone();
        let mut reduced = false;
        for (i, w) in words.iter_mut().enumerate() {
            let before = *w;
            *w &= global[i];
            reduced |= before != *w;
        }
        assert!(reduced);
        assert_eq!(words[0], 0x0000_FFFF);
    }
}
