//! nfspect - Userspace packet interception
//!
//! Binds kernel packet queues over raw netlink, parses the diverted packets
//! into typed protocol headers, hands each one to an inspection callback, and
//! returns its verdict (accept, drop, or modify) to the kernel.

pub mod config;
pub mod error;
pub mod inspect;
pub mod packet;
pub mod protocol;
pub mod queue;
pub mod telemetry;

pub use error::{Error, Result};
