//! Pipeline stages operating on a [`Store`](crate::store::Store).

pub mod coordinates;
pub mod ingest;
pub mod merge;
pub mod pipeline;
pub mod stats;
