//! HTTP handlers for the bridge API.

pub mod native_message;
pub mod status;
