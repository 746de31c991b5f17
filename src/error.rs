use thiserror::Error;

/// Error kinds surfaced to a queue's registered `errors_callback` when the
/// scratch or exception handler observes a fault it cannot recover from
/// transparently. Bit-exact mapping to the raw KFD inactive-signal error
/// bitmask lives in `thunk::queues::scratch` and `thunk::queues::exception`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorKind {
    #[error("invalid queue creation parameters")]
    InvalidQueueCreation,
    #[error("out of resources")]
    OutOfResources,
    #[error("invalid queue")]
    InvalidQueue,
    #[error("incompatible arguments")]
    IncompatibleArguments,
    #[error("invalid allocation")]
    InvalidAllocation,
    #[error("invalid code object")]
    InvalidCodeObject,
    #[error("invalid packet format")]
    InvalidPacketFormat,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid ISA")]
    InvalidIsa,
    #[error("memory aperture violation")]
    MemoryApertureViolation,
    #[error("illegal instruction")]
    IllegalInstruction,
    #[error("memory fault")]
    MemoryFault,
    #[error("exception")]
    Exception,
    #[error("requested CU mask was reduced by a global mask or physical CU count")]
    CuMaskReduced,
    #[error("unspecified error")]
    Error,
}

#[derive(Error, Debug)]
pub enum HsaError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("KFD Driver Error: {0}")]
    Driver(String),

    #[error("Operation timed out")]
    WaitTimeout,

    #[error("Out of GPU Memory")]
    OutOfMemory,

    #[error("Invalid node ID: {0}")]
    InvalidNodeId(u32),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueErrorKind),

    #[error("General Thunk Error: {0}")]
    General(String),
}

// A convenient alias
pub type HsaResult<T> = Result<T, HsaError>;
