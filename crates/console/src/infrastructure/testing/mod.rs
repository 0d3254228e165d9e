//! Test doubles for the outbound ports.

mod fake_api;

pub use fake_api::FakeApi;
