//! Common test utilities and fixtures for context-gateway integration tests
//!
//! This module provides:
//! - `TestProject` builder for creating source trees in a temp directory
//! - Collaborator doubles (slow analyzer, failing template engine)
//! - Assertions over file trees and tool envelopes

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod assertions;
pub mod doubles;
pub mod test_project;

pub use assertions::*;
pub use doubles::*;
pub use test_project::TestProject;
