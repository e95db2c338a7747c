pub mod coordinator;
pub mod derive;
pub mod fetcher;
pub mod qualifying;
pub mod schedule;
pub mod sensors;
pub mod weather;
