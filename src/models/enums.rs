use crate::db::DatabaseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde goes through the same strings, so stored and JSON forms agree.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(PreferredContactMethod {
    Email => "Email",
    Sms => "SMS",
    None => "None",
});

impl Default for PreferredContactMethod {
    fn default() -> Self {
        Self::None
    }
}

str_enum!(AuditOperation {
    Insert => "INSERT",
    Update => "UPDATE",
    Delete => "DELETE",
    Restore => "RESTORE",
});

str_enum!(SortField {
    Name => "name",
    CreatedAt => "created_at",
    UpdatedAt => "updated_at",
});

impl SortField {
    /// Column the field orders by.
    pub fn column(&self) -> &'static str {
        self.as_str()
    }
}

impl Default for SortField {
    fn default() -> Self {
        Self::CreatedAt
    }
}

str_enum!(SortOrder {
    Asc => "asc",
    Desc => "desc",
});

impl Default for SortOrder {
    fn default() -> Self {
        Self::Desc
    }
}

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});
