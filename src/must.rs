//! Panicking shortcuts for scripts and tests.

use crate::error::Result;

pub trait Must<T> {
    /// Unwrap the result, panicking with the error message on failure.
    fn must(self) -> T;

    /// Map not-found to `None`; panic on any other error.
    fn must_found(self) -> Option<T>;
}

impl<T> Must<T> for Result<T> {
    #[track_caller]
    fn must(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    #[track_caller]
    fn must_found(self) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) if e.is_not_found() => None,
            Err(e) => panic!("{e}"),
        }
    }
}
