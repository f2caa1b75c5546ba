//! Request middleware.
//!
//! Purpose: attach a trace identifier to every request so logs, error
//! bodies and background prefetches can be correlated.

pub mod trace;

pub use trace::Trace;
