//! HTTP handlers, grouped by resource.

pub mod cards;
pub mod grammar;
pub mod journey;
pub mod lesson;
pub mod practice;
pub mod settings;
pub mod song_lesson;
pub mod songs;
pub mod stats;
