//! Core data model types: raw part records and emission events.

pub mod event;
pub mod part;
