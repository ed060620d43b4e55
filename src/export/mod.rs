//! Output side: naming decoded parts and writing them out.

pub mod namer;
pub mod sink;
