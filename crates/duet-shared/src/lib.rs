//! # duet-shared
//!
//! Types shared across the duet workspace: participant identity, call
//! identifiers, the signaling wire protocol, and timing constants.

pub mod constants;
pub mod protocol;
pub mod types;
