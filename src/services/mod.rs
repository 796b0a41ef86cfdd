// Outbound collaborators
pub mod catalog;
pub mod payments;

// Orchestration
pub mod orders;
