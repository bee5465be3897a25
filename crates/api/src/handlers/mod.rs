pub mod builds;
pub mod generations;
pub mod runner;
