//! Integration tests for context-gateway
//!
//! These tests drive a real `Gateway` over temp-dir projects.
//!
//! ## Test Tiers
//!
//! - **Tier 1: Unit** - Individual components, mocked collaborators (in src/*.rs)
//! - **Tier 2: Component** - Gateway pipelines end to end (this file)
//!
//! ## Running Integration Tests
//!
//! ```bash
//! cargo test --test integration_tests
//! cargo test --test integration_tests scenarios
//! cargo test --test integration_tests properties
//! cargo test --test integration_tests tools
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

mod common;
mod properties;
mod scenarios;
mod tools;
