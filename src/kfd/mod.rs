pub mod device;
pub mod ioctl;
pub mod sysfs;

/// The sysfs topology scanner used to double-live under the name every public
/// consumer (and the historical duplicate module it replaced) expects.
pub use sysfs as topology;
