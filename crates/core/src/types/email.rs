//! Account email addresses.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why an address was refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("email must look like name@domain.tld")]
    Malformed,
}

/// A normalized account email.
///
/// Addresses are compared after trimming and lowercasing, so
/// `" Wes@Example.COM "` and `"wes@example.com"` are the same account.
/// Dots and `+` sub-addresses are kept as typed.
///
/// ```
/// use delicious_core::Email;
///
/// let email = Email::normalized(" Wes@Example.COM ").unwrap();
/// assert_eq!(email.as_str(), "wes@example.com");
///
/// assert!(Email::normalized("wes").is_err());
/// assert!(Email::normalized("wes@localhost").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// Trim, lowercase and validate user input.
    ///
    /// # Errors
    ///
    /// Returns an error if the normalized address is empty, too long, or not
    /// shaped `local@domain.tld` with a single `@` and no whitespace.
    pub fn normalized(s: &str) -> Result<Self, EmailError> {
        Self::parse(&s.trim().to_lowercase())
    }

    /// Validate an address that is already normalized, such as a stored one.
    ///
    /// # Errors
    ///
    /// Same as [`Email::normalized`], without the trimming and lowercasing.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        if s.is_empty() {
            return Err(EmailError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if s.chars().any(char::is_whitespace) {
            return Err(EmailError::Malformed);
        }

        let (local, domain) = s.split_once('@').ok_or(EmailError::Malformed)?;
        let domain_ok = domain
            .split('.')
            .collect::<Vec<_>>()
            .as_slice()
            .split_last()
            .is_some_and(|(tld, rest)| {
                !rest.is_empty() && tld.len() >= 2 && rest.iter().all(|label| !label.is_empty())
            });
        if local.is_empty() || domain.contains('@') || !domain_ok {
            return Err(EmailError::Malformed);
        }

        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Email {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Email {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Email {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_addresses() {
        for ok in [
            "wes@wesbos.com",
            "wes.bos+delicious@mail.example.co.uk",
            "a@b.io",
        ] {
            assert!(Email::parse(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for bad in [
            "no-at-symbol",
            "@example.com",
            "wes@",
            "wes@localhost",
            "wes@example.c",
            "wes@.com",
            "wes@example..com",
            "we s@example.com",
            "a@b@example.com",
        ] {
            assert_eq!(Email::parse(bad), Err(EmailError::Malformed), "{bad}");
        }
    }

    #[test]
    fn test_length_limits() {
        assert_eq!(Email::parse(""), Err(EmailError::Empty));
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            Email::parse(&long),
            Err(EmailError::TooLong { .. })
        ));
    }

    #[test]
    fn test_normalized_trims_and_lowercases() {
        let email = Email::normalized("  Wes.Bos+Tag@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "wes.bos+tag@example.com");
        assert_eq!(Email::normalized("   "), Err(EmailError::Empty));
    }

    #[test]
    fn test_parse_does_not_normalize() {
        assert_eq!(
            Email::parse(" wes@example.com"),
            Err(EmailError::Malformed)
        );
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let email = Email::normalized("Wes@Example.com").unwrap();
        assert_eq!(
            serde_json::to_string(&email).unwrap(),
            "\"wes@example.com\""
        );
    }
}
