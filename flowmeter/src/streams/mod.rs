/// Idle timeout detection for feed streams.
pub mod timeout;

pub use timeout::IdleTimeout;
