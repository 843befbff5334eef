//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An enum-like string did not match any known variant.
    #[error("invalid {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated class identifier.
    ClassId, "class ID"
);

define_string_id!(
    /// A validated session instance identifier.
    ///
    /// Session IDs are derived from the class and the session's start instant,
    /// so rematerializing the same slot yields the same ID.
    SessionId, "session ID"
);

define_string_id!(
    /// A validated participant (teacher or student) identifier.
    ///
    /// Participants are owned by the roster collaborator; the scheduler only
    /// ever stores their IDs.
    ParticipantId, "participant ID"
);

/// Generates a string-backed enum with `as_str`, `Display` and `FromStr`.
macro_rules! define_str_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// String representation for database storage.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    _ => Err(ValidationError::UnknownVariant {
                        field: $field_name,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

define_str_enum!(
    /// The role a participant plays in a class.
    Role, "participant role" {
        /// Teaches the class; subject to availability checks.
        Teacher => "teacher",
        /// Attends the class.
        Student => "student",
    }
);

define_str_enum!(
    /// Lifecycle state of a class.
    ClassStatus, "class status" {
        /// Running; its sessions count for conflict detection.
        Active => "active",
        /// Finished normally.
        Completed => "completed",
        /// Called off.
        Cancelled => "cancelled",
    }
);

define_str_enum!(
    /// Lifecycle state of a single session instance.
    SessionStatus, "session status" {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

define_str_enum!(
    /// Attendance state for one participant in one session.
    AttendanceStatus, "attendance status" {
        /// Seeded at materialization time.
        Expected => "expected",
        Present => "present",
        Absent => "absent",
        Late => "late",
    }
);

define_str_enum!(
    /// What a conflict check reports when its data cannot be fetched.
    #[derive(Default)]
    FailurePolicy, "failure policy" {
        /// Report no conflict and log a warning.
        #[default]
        Open => "open",
        /// Surface the error to the caller.
        Closed => "closed",
    }
);
