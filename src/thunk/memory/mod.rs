pub mod aperture;
pub mod manager;

use crate::kfd::device::KfdDevice;
use crate::thunk::memory::manager::AllocFlags;
use std::sync::{Arc, Mutex};

/// Shared handle to the process-wide memory manager. Allocations keep a copy
/// so their `Drop` impl can reclaim VA space without the caller threading a
/// manager reference through every destructor.
pub type ArcManager = Arc<Mutex<MemoryManager>>;

/// Represents a successful memory allocation on the GPU.
///
/// Frees itself on drop: unmaps the CPU mapping (if any), releases the KFD
/// handle, and returns the VA range to the owning aperture.
#[derive(Debug)]
pub struct Allocation {
    pub ptr: *mut u8,     // CPU Virtual Address (if mapped)
    pub size: usize,      // Size in bytes
    pub gpu_va: u64,      // GPU Virtual Address
    pub handle: u64,      // KFD Allocation Handle
    pub is_userptr: bool, // Was this imported user memory?
    pub node_id: u32,     // Physical node ID
    pub flags: AllocFlags,
    pub device: KfdDevice,
    pub manager_handle: ArcManager,
}

unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    #[must_use]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if self.handle == 0 {
            return;
        }
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr.cast(), self.size);
            }
        }
        if let Err(e) = self.device.free_memory_of_gpu(self.handle) {
            eprintln!("[Allocation] free_memory_of_gpu({}) failed: {e:?}", self.handle);
        }
        if let Ok(mut mgr) = self.manager_handle.lock() {
            mgr.free_va_from_flags(self.gpu_va, self.size, &self.flags, self.node_id);
        }
    }
}

/// Trait for different aperture allocation strategies (e.g., Reserved vs Mmap).
pub trait ApertureAllocator {
    /// Reserve a virtual address range within this aperture.
    fn allocate_va(&mut self, size: usize, align: usize) -> Option<u64>;

    /// Free a previously reserved virtual address range.
    fn free_va(&mut self, addr: u64, size: usize);

    /// Get the aperture's base and limit.
    fn bounds(&self) -> (u64, u64);
}

// Re-export the main manager for easy access
pub use manager::MemoryManager;
