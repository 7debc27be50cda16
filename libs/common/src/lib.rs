//! Identifier helpers shared by the PairPad services.

pub mod id;
pub mod room_code;
