//! Error returned by the swarm core.
//!
//! Peer, DHT and tracker failures never show up here: inside the
//! waterfall they all mean "try the next candidate". What can surface
//! is a plan with no usable fetch entry, a CAS/CDN failure on the final
//! stage, or an output-file write failure.

use zest_primitives::{ChunkRange, XorbHash};

use crate::cas;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The reconstruction plan has no fetch-info list for a xorb one of
    /// its terms needs.
    #[error("reconstruction plan has no fetch info for xorb {0}")]
    MissingFetchInfo(XorbHash),

    /// No fetch-info entry covers the term's chunk range.
    #[error("no fetch entry covers chunks {range} of xorb {xorb_hash}")]
    NoCoveringFetchEntry { xorb_hash: XorbHash, range: ChunkRange },

    /// The collaborator failed; includes CDN failures on the final
    /// waterfall stage and authentication errors, surfaced unchanged.
    #[error(transparent)]
    Cas(#[from] cas::Error),

    /// Writing the reconstructed file failed.
    #[error("writing output file: {0}")]
    Io(#[from] std::io::Error),
}
