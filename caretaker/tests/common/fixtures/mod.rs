//! This module provides reusable test utilities:
//! - Scripted stand-ins for commands, certificates, sinks and stages
//! - A harness wiring store, dispatcher and database on a manual clock
//! - A mock webhook server
//! - Test configuration builders
//! - Common test data

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod doubles;
pub mod harness;
pub mod mock_webhook;
pub mod test_config;
pub mod test_data;

// Re-export commonly used items
pub use doubles::*;
pub use harness::Harness;
pub use mock_webhook::MockWebhookServer;
pub use test_config::TestConfigBuilder;
pub use test_data::*;
