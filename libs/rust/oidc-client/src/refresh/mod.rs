//! Refresh endpoint protocol and refresh coordination.

pub mod coordinator;
pub mod protocol;

pub use coordinator::{Flight, RefreshCoordinator};
pub use protocol::{RefreshedTokens, build_refresh_headers, parse_refresh_response};
