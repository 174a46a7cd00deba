//! Orchestration functions and their flow diagrams

pub mod approval;
pub mod flows;

pub use approval::approval_orchestration;
