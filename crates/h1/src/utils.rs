//! Small internal helpers.

/// Returns early with `$error` unless `$predicate` holds.
///
/// Like `assert!`, but for validation that reports an error instead of panicking.
///
/// ```ignore
/// ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
