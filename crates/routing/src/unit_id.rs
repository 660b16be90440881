//! Exec unit identifier

use std::fmt;

/// Identifier of one exec unit, unique across the engine.
///
/// Monotonically assigned at registration. The wire carries it as a 32-bit
/// signed integer; id 0 is reserved for frames addressed to a plugin rather
/// than to one of its units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(i32);

impl UnitId {
    /// The plugin-level address: not a unit.
    pub const CONTROL: UnitId = UnitId(0);

    #[inline]
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// True for the plugin-level address.
    #[inline]
    pub const fn is_control(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit:{}", self.0)
    }
}

impl From<i32> for UnitId {
    #[inline]
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl From<UnitId> for i32 {
    #[inline]
    fn from(id: UnitId) -> Self {
        id.0
    }
}
