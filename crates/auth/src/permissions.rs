use serde::{Deserialize, Serialize};

use keystone_core::DomainError;

/// Capability bitmask.
///
/// Each bit is an independent capability; any number of bits may be set at
/// once. The named flags below never share a bit. Stored and transported as a
/// plain unsigned integer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionFlags(u32);

impl PermissionFlags {
    pub const NONE: Self = Self(0);
    pub const FREE: Self = Self(1 << 0);
    pub const PAID: Self = Self(1 << 1);
    pub const ADMIN: Self = Self(1 << 2);
    pub const ANOTHER_PAID: Self = Self(1 << 3);
    pub const ALL: Self = Self(u32::MAX);

    /// Flags granted to a freshly registered principal.
    pub const DEFAULT: Self = Self::FREE;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True iff at least one bit of `required` is present.
    ///
    /// Intersection test, not subset: extra bits never hurt, and a `required`
    /// value with several bits is satisfied by any one of them.
    pub const fn has_any(self, required: Self) -> bool {
        self.0 & required.0 != 0
    }

    pub const fn is_admin(self) -> bool {
        self.has_any(Self::ADMIN)
    }
}

impl core::ops::BitOr for PermissionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitAnd for PermissionFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<u32> for PermissionFlags {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Parses a decimal bitmask, as carried in request paths.
impl core::str::FromStr for PermissionFlags {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| DomainError::validation(format!("permission flags must be an unsigned integer, got {s:?}")))
    }
}

impl core::fmt::Display for PermissionFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

/// Does `mask` hold at least one of the `required` capabilities?
pub fn has_any(mask: PermissionFlags, required: PermissionFlags) -> bool {
    mask.has_any(required)
}

/// Ownership-or-admin predicate.
///
/// Passes when the caller acts on their own record, or holds `admin_bit`.
pub fn is_self_or_admin(
    caller_id: &str,
    target_id: &str,
    mask: PermissionFlags,
    admin_bit: PermissionFlags,
) -> bool {
    caller_id == target_id || mask.has_any(admin_bit)
}
