use serde::{Deserialize, Serialize};

/// ISO 3166-1 alpha-2 style country code, normalized to upper case.
///
/// Used as the scope of per-country layer and source keys and as the
/// regional cache key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        CountryCode(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CountryCode {
    fn from(value: String) -> Self {
        CountryCode::new(value)
    }
}

impl From<&str> for CountryCode {
    fn from(value: &str) -> Self {
        CountryCode::new(value)
    }
}

impl From<CountryCode> for String {
    fn from(value: CountryCode) -> Self {
        value.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::CountryCode;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(CountryCode::new(" jp ").as_str(), "JP");
        assert_eq!(CountryCode::from("fr"), CountryCode::new("FR"));
    }
}
