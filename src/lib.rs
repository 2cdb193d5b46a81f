// ===================================================================================================
// swarm-core — peer membership, failure detection, discovery, and task delegation for a mesh
// of cooperating agent nodes.
// ===================================================================================================
//
// Designed to be embedded: construct a `MeshManager` and (optionally) a `WorkDistributor`,
// start the mesh, and mount `api_server::build_router` into your own axum server — or run
// the bundled binary, which does exactly that.
// ===================================================================================================

pub mod api_server;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod distributor;
pub mod error;
pub mod identity;
pub mod logging;
pub mod mesh;
pub mod messages;
pub mod peer;
pub mod session;
pub mod transport;
pub mod ui;

pub use config::SwarmConfig;
pub use distributor::WorkDistributor;
pub use error::{SwarmError, SwarmResult};
pub use identity::NodeIdentity;
pub use mesh::{MeshManager, SwarmEvent};
pub use peer::{PeerEntry, PeerStatus};
pub use session::SessionFactory;
