//! Small helpers shared across the crate.
//!
//! - **URL validation**: feed URLs must be http(s) with a host
//! - **Paths and channels**: `~` expansion and channel-name normalisation
//! - **Panics**: readable message from a caught panic payload

mod paths;
mod url_validator;

pub use paths::{as_channel, expand_home};
pub use url_validator::{validate_url, UrlValidationError};

/// Best-effort text of a panic payload caught with `catch_unwind`.
pub fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
