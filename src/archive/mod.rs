//! Archive collaborator — the document store this service classifies into.
//!
//! Everything the rest of the crate knows about the archive goes through
//! the [`client::ArchiveClient`] trait and the injected [`cache::EntityCache`].

pub mod cache;
pub mod client;
pub mod models;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot reach archive at {0}")]
    Connection(String),

    #[error("archive request failed: {0}")]
    Http(String),

    #[error("archive returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected archive response: {0}")]
    ResponseParsing(String),

    #[error("{entity} '{name}' not found in entity cache")]
    CacheMiss { entity: &'static str, name: String },
}
