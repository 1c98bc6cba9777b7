pub mod competition;
pub mod orchestrator;
