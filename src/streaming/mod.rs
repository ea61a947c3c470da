//! Segmented media delivery.
//!
//! One long-running conversion per (media, player, quality) tuple is shared
//! by every request for that tuple's segments: the session manager is
//! admission control (one producer), fan-out (many waiting consumers), and
//! garbage collection (supersession and shutdown) in one place.

mod producer;
mod sessions;

pub use producer::{ChainSegmentProducer, ProducerHandle, SegmentProducer};
pub use sessions::{SegmentSession, SegmentSessionManager, SessionKey};
