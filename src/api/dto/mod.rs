//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are camelCase to match the push payloads clients already
//! consume.

pub mod notification_dto;

pub use notification_dto::*;
