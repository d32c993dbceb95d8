//! Provides engine implementations of the [`Engine`](crate::Engine) traits. The default engine is
//! built when the `default-engine` feature flag is set. See the related modules for more
//! information.

pub mod default;
