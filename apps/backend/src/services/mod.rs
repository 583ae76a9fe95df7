//! Orchestration over the store, clock and enrichment clients.

pub mod accountant;
pub mod cards;
pub mod composer;
pub mod enrichment;
pub mod grammar;
pub mod lyrics;
pub mod practice;
pub mod registry;
pub mod runner;
pub mod songs;
