//! URL slugs derived from display names.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A URL-safe identifier derived from a store name.
///
/// ## Derivation
///
/// - ASCII letters are lowercased, ASCII digits are kept
/// - Every other run of characters becomes a single `-`
/// - Leading and trailing `-` are dropped
/// - A name with nothing usable in it becomes `store`
///
/// ## Examples
///
/// ```
/// use delicious_core::Slug;
///
/// assert_eq!(Slug::from_name("Wes's  Coffee & Donuts!").as_str(), "wes-s-coffee-donuts");
/// assert_eq!(Slug::from_name("Café Olé").as_str(), "caf-ol");
/// assert_eq!(Slug::from_name("!!!").as_str(), "store");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Slug used when a name contains no ASCII alphanumerics.
    pub const FALLBACK: &'static str = "store";

    /// Derive the base slug for a name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let mut out = String::with_capacity(name.len());
        let mut pending_dash = false;

        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(c.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }

        if out.is_empty() {
            out.push_str(Self::FALLBACK);
        }

        Self(out)
    }

    /// Wrap a slug read back from storage without re-deriving it.
    #[must_use]
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Returns the slug with `-<n>` appended.
    #[must_use]
    pub fn with_suffix(&self, n: i64) -> Self {
        Self(format!("{}-{n}", self.0))
    }

    /// Pick the slug to store given how many existing slugs collide with this base.
    ///
    /// No collisions keeps the base; `count` collisions yields `base-<count + 1>`.
    #[must_use]
    pub fn disambiguate(&self, existing: i64) -> Self {
        if existing <= 0 {
            self.clone()
        } else {
            self.with_suffix(existing + 1)
        }
    }

    /// Case-insensitive POSIX pattern matching this base and any `base-<number>`.
    ///
    /// Slugs only contain `[a-z0-9-]`, so the base needs no escaping.
    #[must_use]
    pub fn collision_pattern(&self) -> String {
        format!("^{}(-[0-9]+)?$", self.0)
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Slug` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Slug {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Slug {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Slug {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_basic() {
        assert_eq!(Slug::from_name("Coffee Shop").as_str(), "coffee-shop");
    }

    #[test]
    fn test_from_name_collapses_separators() {
        assert_eq!(
            Slug::from_name("  The -- Best   Bagels!! ").as_str(),
            "the-best-bagels"
        );
    }

    #[test]
    fn test_from_name_keeps_digits() {
        assert_eq!(Slug::from_name("Route 66 Diner").as_str(), "route-66-diner");
    }

    #[test]
    fn test_from_name_drops_non_ascii() {
        assert_eq!(Slug::from_name("Crêpes à Gogo").as_str(), "cr-pes-gogo");
    }

    #[test]
    fn test_from_name_fallback() {
        assert_eq!(Slug::from_name("").as_str(), "store");
        assert_eq!(Slug::from_name("☕ 🍩").as_str(), "store");
    }

    #[test]
    fn test_disambiguate_sequence() {
        // Each new store sees every earlier one as a collision.
        let base = Slug::from_name("Donut Palace");
        let slugs: Vec<String> = (0..4)
            .map(|existing| base.disambiguate(existing).into_inner())
            .collect();

        assert_eq!(
            slugs,
            vec![
                "donut-palace",
                "donut-palace-2",
                "donut-palace-3",
                "donut-palace-4"
            ]
        );
    }

    #[test]
    fn test_collision_pattern() {
        let base = Slug::from_name("Donut Palace");
        assert_eq!(base.collision_pattern(), "^donut-palace(-[0-9]+)?$");
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(Slug::from_name("x").with_suffix(7).as_str(), "x-7");
    }
}
