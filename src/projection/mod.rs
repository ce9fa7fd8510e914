//! Stream projections.
//!
//! A [`Query`] folds persisted events into caller-defined state: pick the
//! streams, register handlers, and drive the fold with [`Query::run`].

mod query;

pub use query::{Flow, Query};
