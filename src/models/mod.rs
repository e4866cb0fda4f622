//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! together with the request/response bodies of the HTTP API.

/// Value in a TEXT status/kind column that matches no enum variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares an enum stored as TEXT in PostgreSQL.
///
/// Generates serde (de)serialization under the given string, `as_str`,
/// `Display`, `FromStr` and `TryFrom<String>`; the last one lets row structs
/// use `#[sqlx(try_from = "String")]`.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err($crate::models::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::models::UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

/// Default and maximum page sizes for list endpoints.
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Query string for list endpoints without other filters.
#[derive(Debug, Default, serde::Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Clamp client-supplied paging parameters to sane bounds.
pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// API key authentication model
pub mod api_key;
/// Audit trail of admin actions
pub mod audit_log;
/// Fee configuration and calculation
pub mod fee_rule;
/// KYC submissions and review
pub mod kyc;
/// Append-only wallet ledger
pub mod ledger;
/// Outbound bank transfers
pub mod payout;
/// Payout risk limits
pub mod risk_rule;
/// Settlement runs that clear deposits
pub mod settlement;
/// Tenants
pub mod tenant;
/// Users and onboarding
pub mod user;
/// Partner-issued virtual bank accounts
pub mod virtual_account;
/// Wallets and balance arithmetic
pub mod wallet;
/// Inbound payment processor webhooks
pub mod webhook;

#[cfg(test)]
mod tests {
    use super::*;

    text_enum! {
        enum Colour {
            Red => "red",
            DarkBlue => "dark_blue",
        }
    }

    #[test]
    fn text_enum_round_trips_through_its_string_form() {
        assert_eq!("dark_blue".parse::<Colour>().unwrap(), Colour::DarkBlue);
        assert_eq!(Colour::Red.to_string(), "red");
        assert_eq!(serde_json::to_string(&Colour::DarkBlue).unwrap(), "\"dark_blue\"");
    }

    #[test]
    fn text_enum_rejects_unknown_values() {
        let err = Colour::try_from("green".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "unknown Colour value: green");
    }

    #[test]
    fn paging_is_clamped() {
        assert_eq!(page(None, None), (DEFAULT_PAGE_SIZE, 0));
        assert_eq!(page(Some(10_000), Some(-5)), (MAX_PAGE_SIZE, 0));
        assert_eq!(page(Some(0), Some(20)), (1, 20));
    }
}
