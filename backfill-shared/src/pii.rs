use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for customer contact data (phone numbers, email addresses).
///
/// `Debug` and `Display` never print the wrapped value, so a contact can be
/// passed to `tracing` macros without leaking it. Use [`Masked::hint`] when a
/// log line needs something an operator can correlate.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Storage and providers need the real value; only formatting is masked.
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Masked<String> {
    /// Partially redacted form: `j***@example.com` for emails, `***42` for numbers.
    pub fn hint(&self) -> String {
        redact_contact(&self.0)
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub fn redact_contact(address: &str) -> String {
    if let Some((local, domain)) = address.split_once('@') {
        let first = local.chars().next().map(String::from).unwrap_or_default();
        return format!("{}***@{}", first, domain);
    }

    let digits: Vec<char> = address.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 2 {
        return "***".to_string();
    }
    let tail: String = digits[digits.len() - 2..].iter().collect();
    format!("***{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_value() {
        let contact = Masked::new("+4915112345678".to_string());
        assert_eq!(format!("{:?}", contact), "********");
        assert_eq!(format!("{}", contact), "********");
    }

    #[test]
    fn test_serialize_passes_through() {
        let contact = Masked::new("anna@example.com".to_string());
        let json = serde_json::to_string(&contact).unwrap();
        assert_eq!(json, "\"anna@example.com\"");

        let back: Masked<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expose(), "anna@example.com");
    }

    #[test]
    fn test_hint() {
        assert_eq!(Masked::from("anna@example.com").hint(), "a***@example.com");
        assert_eq!(Masked::from("+49 151 1234 5678").hint(), "***78");
        assert_eq!(Masked::from("7").hint(), "***");
    }
}
