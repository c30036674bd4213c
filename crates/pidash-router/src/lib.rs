//! Topic mapping, payload normalization and update distribution.
//!
//! The pipeline is `wire topic → TopicMap → TopicId`, then
//! `payload → normalize → NormalizedMessage`, then `Router::dispatch`
//! fans the record out to registered widgets. All three stages are pure
//! with respect to I/O; the broker and WebSocket layers sit outside.

pub mod mapper;
pub mod normalize;
pub mod router;

pub use mapper::TopicMap;
pub use normalize::normalize;
pub use router::{Router, Widget};
