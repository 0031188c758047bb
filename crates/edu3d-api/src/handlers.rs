//! Request handlers.

pub mod examples;
pub mod health;
pub mod jobs;
pub mod videos;

pub use examples::*;
pub use health::*;
pub use jobs::*;
pub use videos::*;
