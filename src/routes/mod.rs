pub mod health;
pub mod sensors;
pub mod sources;
