//! Content analysis used when finalizing file payloads
//!
//! - `checksum`: blake3 digest of a payload
//! - `filetype`: MIME type and image detection from header bytes

pub mod checksum;
pub mod filetype;

pub use checksum::compute_checksum;
pub use filetype::{sniff, Sniffed};
