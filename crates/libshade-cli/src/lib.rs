//! Programmatic API for shade
//!
//! [`ShadowManager`] owns one shadow repository and exposes every operation
//! on it. With the `async` feature, [`AsyncShadowManager`] wraps it for use
//! from a tokio runtime.

mod manager;
mod transactions;

#[cfg(feature = "async")]
mod async_manager;

pub use manager::ShadowManager;

#[cfg(feature = "async")]
pub use async_manager::AsyncShadowManager;
