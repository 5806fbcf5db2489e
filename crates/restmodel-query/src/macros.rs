//! Keyword-argument style macros for filters and assignments.
//!
//! Lookup suffixes ride on the key name, exactly as in the string form:
//! `filters!(title__icontains = "rust", pk__in = ids)`.

/// Build a `Vec<Cond>` from `key = value` pairs.
///
/// Keys parse through [`Cond::parse`](crate::Cond::parse), so `__`-suffixed
/// lookups and the `pk` alias both work.
#[macro_export]
macro_rules! filters {
    ($($key:ident = $value:expr),* $(,)?) => {
        ::std::vec![
            $($crate::Cond::parse(::core::stringify!($key), $crate::Value::from($value))),*
        ]
    };
}

/// Build a `Vec<(String, Value)>` assignment list from `key = value` pairs.
#[macro_export]
macro_rules! assigns {
    ($($key:ident = $value:expr),* $(,)?) => {
        ::std::vec![
            $((
                ::std::string::String::from(::core::stringify!($key)),
                $crate::Value::from($value),
            )),*
        ]
    };
}
