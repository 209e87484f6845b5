//! termsync binary support: configuration, logging, and the file-backed
//! event channel and sink that stand in for the external transport.

pub mod channel;
pub mod config;
pub mod logging;
pub mod sink;
