//! Email parsing: raw header decoding, date handling and MIME part walking.

pub mod header;
pub mod mime;
