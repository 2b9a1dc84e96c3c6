pub mod config;
pub mod controller;
pub mod error;
pub mod io;
pub mod job;
pub mod perturb;
pub mod planner;
pub mod region;
pub mod scheduler;
pub mod script;
pub mod solver;
pub mod surge;
pub mod track;
pub mod workdir;

pub use error::{Error, Result};
