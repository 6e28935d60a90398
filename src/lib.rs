//! `lostphotosfound`: recover the photos buried in a Gmail account.
//!
//! This crate searches the All Mail folder over IMAP for messages with image
//! attachments, walks their MIME structure and saves each attachment to disk
//! under a date-prefixed name.

pub mod config;
pub mod error;
pub mod export;
pub mod imap;
pub mod model;
pub mod parser;
pub mod pipeline;
