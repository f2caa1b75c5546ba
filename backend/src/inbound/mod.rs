//! Inbound adapters translating external requests into pipeline calls while
//! keeping framework details at the edge.

pub mod http;
