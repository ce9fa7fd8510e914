//! Database schema definitions using sea-query.
//!
//! These define the column identifiers for type-safe query building. Table
//! names are dynamic (the registry table is configurable, stream tables are
//! hash-derived), so the identifiers here cover columns only; physical
//! table creation is handled by the persistence strategies.

use sea_query::Iden;

/// Stream registry columns.
///
/// One row per logical stream: the real name, the derived physical table
/// name, and the opaque stream metadata persisted at creation.
#[derive(Iden)]
pub enum EventStreams {
    #[iden = "real_stream_name"]
    RealStreamName,
    #[iden = "stream_name"]
    StreamName,
    #[iden = "metadata"]
    Metadata,
}

/// Per-stream event table columns.
///
/// `No` is the dense per-stream position assigned on append. Strategies may
/// maintain additional generated columns; those never appear in selects.
#[derive(Iden)]
pub enum StreamEvents {
    #[iden = "no"]
    No,
    #[iden = "event_id"]
    EventId,
    #[iden = "event_name"]
    EventName,
    #[iden = "payload"]
    Payload,
    #[iden = "metadata"]
    Metadata,
    #[iden = "created_at"]
    CreatedAt,
}
