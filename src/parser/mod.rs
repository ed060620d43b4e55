//! MIME parsing: header blocks, content types, boundary splitting,
//! transfer decoding, and recursive multipart descent.

pub mod boundary;
pub mod content_type;
pub mod header;
pub mod message;
pub mod mime;
pub mod transfer;
