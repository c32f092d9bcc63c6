//! Tripwire: BLAKE3 input hashing and provenance tracing.

pub mod eventlog;
pub mod hasher;
