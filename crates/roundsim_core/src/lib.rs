//! # roundsim_core
//!
//! Round-synchronized simulator for message-passing distributed protocols.
//!
//! One OS thread per topology vertex runs the same [`Protocol`]; all of them
//! rendezvous twice per round at a [`RoundBarrier`]. An optional
//! [`reliability`] updater perturbs the topology between rounds while every
//! node is parked on its handshake.
//!
//! ```no_run
//! use roundsim_core::{Coordinator, GraphSpec, ProtocolKind, SimulationConfig};
//!
//! let topology = "grid,4,4".parse::<GraphSpec>()?.build(1.0)?;
//! let mut coordinator = Coordinator::new(topology, SimulationConfig::default())?;
//! let stats = coordinator.run_simulation(ProtocolKind::Hll)?;
//! println!("estimate {} after {} rounds", stats.stations[0].result, stats.nof_rounds);
//! # Ok::<(), roundsim_core::SimError>(())
//! ```

pub mod barrier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hll;
pub mod mailbox;
pub mod node;
pub mod protocol;
pub mod reliability;
pub mod router;
pub mod stats;
pub mod topology;

pub use barrier::RoundBarrier;
pub use config::SimulationConfig;
pub use coordinator::Coordinator;
pub use error::{SimError, SimResult};
pub use hll::HyperLogLog;
pub use mailbox::{Mailbox, Message, Postbox};
pub use node::{Node, Station, StationSnapshot};
pub use protocol::{CountDistinct, MinPropagation, Protocol, ProtocolKind};
pub use reliability::{EdgeUpdater, NodeHandshake, ReliabilityModel, UpdaterReport};
pub use router::Router;
pub use stats::{SimulationStats, Summary};
pub use topology::{GraphDocument, GraphSpec, Topology};
