// ABOUTME: Test doubles for the engine's collaborators.
// ABOUTME: Scripted transport and counting auth provider for deterministic tests.

pub mod mock_auth;
pub mod mock_transport;

pub use mock_auth::MockAuthProvider;
pub use mock_transport::{ListStep, MockTransport};
