//! Broker wire protocol: length-prefixed MessagePack frames.

pub mod codec;
pub mod protocol;
