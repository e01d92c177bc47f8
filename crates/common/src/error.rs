//! Context helpers shared by every crate's typed error.

/// Error types that can be built from a plain message.
///
/// Implement this for a crate's `Error`, then invoke [`impl_context!`] in the
/// same module to get `.context()` and `.with_context()` on `Result` and
/// `Option` without pulling `anyhow` into library code.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Define a crate-local `Context` trait for `Result` and `Option`.
///
/// The invoking module must have `Error: FromMessage` and
/// `Result<T> = std::result::Result<T, Error>` in scope.
///
/// ```ignore
/// // crates/runtime/src/error.rs
/// courier_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T>: Sized {
            /// Wrap the failure (or absence) with `context`.
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context)
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    let context: String = f().into();
                    <Error as $crate::FromMessage>::from_message(format!("{context}: {source}"))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    mod ctx {
        #[derive(Debug, thiserror::Error)]
        #[error("{0}")]
        pub struct Error(String);

        impl crate::FromMessage for Error {
            fn from_message(message: String) -> Self {
                Self(message)
            }
        }

        pub type Result<T> = std::result::Result<T, Error>;

        crate::impl_context!();
    }

    use ctx::Context;

    #[test]
    fn context_prefixes_result_errors() {
        let res: Result<(), std::fmt::Error> = Err(std::fmt::Error);
        let err = res.context("formatting receipt").unwrap_err();
        assert!(err.to_string().starts_with("formatting receipt: "));
    }

    #[test]
    fn context_on_none_uses_message() {
        let missing: Option<u8> = None;
        let err = missing.with_context(|| "thread not found").unwrap_err();
        assert_eq!(err.to_string(), "thread not found");
        assert_eq!(Some(3).context("unused").unwrap(), 3);
    }
}
