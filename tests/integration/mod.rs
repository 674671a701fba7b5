// Integration test modules
pub mod component_tests;
pub mod dispatcher_tests;
pub mod scenario_tests;

// Shared fixtures
#[path = "../common/mod.rs"]
pub mod common;
