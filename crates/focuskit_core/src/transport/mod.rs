//! Byte-level transports between UI surfaces and the broker actor.

pub mod native_messaging;
