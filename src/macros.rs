/// Return early with the given error if the predicate does not hold.
macro_rules! ensure {
    ($predicate:expr, $err:expr $(,)?) => {
        if !$predicate {
            return Err($err.into());
        }
    };
}

/// Assert that a `Result` is the expected error.
#[cfg(test)]
macro_rules! assert_err {
    ($result:expr, $err:expr $(,)?) => {
        assert_eq!($result, Err($err.into()));
    };
}
