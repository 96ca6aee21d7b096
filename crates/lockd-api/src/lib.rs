//! lockd API - wire protocol definitions
//!
//! This crate provides:
//! - The packet model exchanged between clients and the lock server
//! - The length-prefixed frame codec used on every connection

pub mod codec;
pub mod model;

// Re-export commonly used types
pub use codec::{
    CodecError, Decoded, decode_body, decode_frame, encode_frame, parse_header, read_packet,
    write_packet,
};
pub use model::*;
