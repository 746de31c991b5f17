pub mod async_handler;
pub mod context;
pub mod events;
pub mod memory;
pub mod queues;
pub mod signal;
pub mod topology;
