//! Core tunnel primitives shared by the hub and the agent: the cluster
//! session registry, the token mapper, the peer directory, the mux
//! adapter, and the admission defaulting/validation functions.

pub mod cluster;
pub mod error;
pub mod mutator;
pub mod mux;
pub mod peer;
pub mod registry;
pub mod session;
pub mod token;

pub use cluster::{ClusterKey, ClusterRecord, ClusterRecordStore};
pub use error::{RelayError, RelayResult};
pub use peer::{Peer, PeerDirectory};
pub use registry::ClusterSessionRegistry;
pub use session::{LogicalStream, Session};
pub use token::ClusterTokenMapper;
