//! Small helpers for plumbing [`asupersync::Outcome`] through layered calls.

use asupersync::Outcome;

/// Lift a plain `Result` into an [`Outcome`].
pub fn outcome_from<T, E>(result: Result<T, E>) -> Outcome<T, E> {
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(err) => Outcome::Err(err),
    }
}

/// Unwrap the `Ok` payload of an [`Outcome`] expression, or return early.
///
/// Errors pass through `Into`, so a caller with a wider error type can
/// consume outcomes from a lower layer. Cancellation and panic outcomes are
/// forwarded untouched.
#[macro_export]
macro_rules! try_outcome {
    ($outcome:expr) => {
        match $outcome {
            ::asupersync::Outcome::Ok(value) => value,
            ::asupersync::Outcome::Err(err) => {
                return ::asupersync::Outcome::Err(::core::convert::Into::into(err));
            }
            ::asupersync::Outcome::Cancelled(reason) => {
                return ::asupersync::Outcome::Cancelled(reason);
            }
            ::asupersync::Outcome::Panicked(payload) => {
                return ::asupersync::Outcome::Panicked(payload);
            }
        }
    };
}
