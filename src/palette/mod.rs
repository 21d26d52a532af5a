// src/palette/mod.rs

pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod error;
pub mod event;
pub mod governor;
pub mod health;
pub mod input_gate;
pub mod roster;
pub mod scheduler;
pub mod supervisor;
pub mod team;
pub mod termination;
pub mod transcript;
pub mod worker;

// Let's explicitly export Team so we don't have to access it via palette::team::Team
// and instead as palette::Team
pub use team::{Team, TeamBuilder};
