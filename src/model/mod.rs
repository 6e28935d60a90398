//! Core data model types for matched messages and saved attachments.

pub mod attachment;
pub mod message;
