pub mod auth;
pub mod change_feed;
pub mod medication_service;

#[cfg(test)]
mod medication_service_tests;
