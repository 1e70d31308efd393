//! Stable entity identifiers

use core::fmt;
use core::num::NonZeroU64;

/// Identifier of one script-bound entity
///
/// The native engine owns the numbering (typically a UUID truncated to 64
/// bits). The value survives module reloads, which is what lets a snapshot
/// taken before an unload be matched back to its entity afterwards.
/// `0` is reserved as "no entity" wherever an identifier crosses a flat
/// document or an FFI boundary.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(NonZeroU64);

impl EntityId {
    /// Raw value used for "no entity"
    pub const NONE_BITS: u64 = 0;

    /// Create an identifier, returning `None` for the reserved zero value
    #[inline]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw value
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0.get()
    }

    /// Encode an optional identifier with zero standing in for `None`
    #[inline]
    pub fn to_bits(id: Option<EntityId>) -> u64 {
        id.map_or(Self::NONE_BITS, |id| id.get())
    }

    /// Decode an optional identifier, mapping zero to `None`
    #[inline]
    pub const fn from_bits(bits: u64) -> Option<EntityId> {
        Self::new(bits)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_reserved() {
        assert!(EntityId::new(0).is_none());
        assert_eq!(EntityId::from_bits(0), None);
        assert_eq!(EntityId::to_bits(None), 0);
    }

    #[test]
    fn test_bits_round_trip() {
        let id = EntityId::new(7).unwrap();
        assert_eq!(id.get(), 7);
        assert_eq!(EntityId::to_bits(Some(id)), 7);
        assert_eq!(EntityId::from_bits(7), Some(id));
        assert_eq!(u64::from(id), 7);
    }
}
