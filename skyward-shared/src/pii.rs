use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps a sensitive value (OTP codes, passport numbers) so log macros never print it whole.
///
/// `Debug` hides everything; `Display` keeps the last two characters so an operator
/// can still correlate log lines. Serialization passes the real value through.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn reveal(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0.as_ref();
        let chars: Vec<char> = value.chars().collect();
        if chars.len() <= 2 {
            return write!(f, "****");
        }
        let tail: String = chars[chars.len() - 2..].iter().collect();
        write!(f, "****{}", tail)
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}
