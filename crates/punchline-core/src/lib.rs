pub mod aggregate;
pub mod completion;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod model;
pub mod providers;
pub mod registry;
pub mod roster;
pub mod storage;
pub mod usage;

pub use engine::orchestrator::{
    Orchestrator, OrchestratorOptions, Payload, RunReport, StatusReport, Ticket,
};
pub use errors::{CompetitionError, StoreError};
pub use ledger::{Ledger, VoteReceipt, Voter, VoterSession};
