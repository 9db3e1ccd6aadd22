/// Defines a lazily-initialized static regex in place.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($re).unwrap());
        &*RE
    }};
}
