//! Squarrin: a permissioned user registry and follow graph, bound once to
//! the fixed-supply Quadreum token.
//!
//! * [`ledger`]: the single-writer state machine (users, follow edges,
//!   token binding, journal, state root).
//! * [`service`]: a serialized writer thread in front of the state machine.
//! * [`token`]: the Quadreum token and its bootstrap call into the ledger.
//! * [`deploy`]: ordered construction of a ledger and its token.

pub mod address;
pub mod admin;
pub mod clock;
pub mod config;
pub mod deploy;
pub mod graph;
pub mod ledger;
pub mod service;
pub mod token;

pub use address::{Address, Amount, Timestamp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LedgerConfig, RewardConfig};
pub use deploy::{DeployError, Deployer, Deployment};
pub use graph::FollowStatus;
pub use ledger::{LedgerError, LedgerEvent, LedgerState, User};
pub use service::SquarrinHandle;
pub use token::{BootstrapTarget, Quadreum, TokenError, TOTAL_SUPPLY};
