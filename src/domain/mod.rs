pub mod errors;
pub mod medication;
pub mod repository;
pub mod schedule;
