//! Client side of the image studio: a typed HTTP client plus the
//! generation controller that drives one retryable, cancellable
//! "generate" operation for a UI layer.

pub mod api;
pub mod controller;
pub mod error;
pub mod retry;
pub mod studio;

pub use api::{ClientConfig, Session, StudioClient};
pub use controller::{GenerationController, GenerationRequest, GenerationState, GenerationTransport};
pub use error::{AttemptError, ClientError};
pub use retry::RetryPolicy;
pub use studio::Studio;
