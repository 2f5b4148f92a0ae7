use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Role held by a permission grant, and equally the operation a caller asks
/// to perform. Totally ordered: admin > write > read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Read,
    Write,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Write, Role::Read];

    /// Returns true if a grant of this role satisfies the requested operation.
    ///
    /// | grant \ op | admin | write | read |
    /// |------------|-------|-------|------|
    /// | admin      |   x   |   x   |  x   |
    /// | write      |       |   x   |  x   |
    /// | read       |       |       |  x   |
    #[must_use]
    pub const fn allows(self, operation: Role) -> bool {
        matches!(
            (self, operation),
            (Role::Admin, _)
                | (Role::Write, Role::Write | Role::Read)
                | (Role::Read, Role::Read)
        )
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "write" => Some(Role::Write),
            "read" => Some(Role::Read),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Write => "write",
            Role::Read => "read",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| {
            Error::InvalidArgument(
                "Selected role is not valid, must be one of `admin`, `write`, or `read`".into(),
            )
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table() {
        assert!(Role::Admin.allows(Role::Admin));
        assert!(Role::Admin.allows(Role::Write));
        assert!(Role::Admin.allows(Role::Read));

        assert!(!Role::Write.allows(Role::Admin));
        assert!(Role::Write.allows(Role::Write));
        assert!(Role::Write.allows(Role::Read));

        assert!(!Role::Read.allows(Role::Admin));
        assert!(!Role::Read.allows(Role::Write));
        assert!(Role::Read.allows(Role::Read));
    }

    #[test]
    fn test_allows_is_downward_closed() {
        for grant in Role::ALL {
            for op in Role::ALL {
                if grant.allows(op) {
                    for lower in Role::ALL.into_iter().filter(|r| *r <= op) {
                        assert!(grant.allows(lower), "{grant} allows {op} but not {lower}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(Role::parse("write"), Some(Role::Write));
        assert_eq!(Role::parse("Admin"), None);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!("read".parse::<Role>().unwrap(), Role::Read);
    }

    #[test]
    fn test_ordering() {
        assert!(Role::Admin > Role::Write);
        assert!(Role::Write > Role::Read);
        assert_eq!(Role::Read.max(Role::Admin), Role::Admin);
    }
}
