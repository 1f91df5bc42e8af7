//! Migration flag bitset and name resolution
//!
//! Bit values mirror libvirt's `virDomainMigrateFlags`.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::FlagError;

/// OR-combination of `VIR_MIGRATE_*` bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrateFlags(u32);

impl MigrateFlags {
    pub const NONE: Self = Self(0);
    pub const LIVE: Self = Self(1 << 0);
    pub const PEER2PEER: Self = Self(1 << 1);
    pub const TUNNELLED: Self = Self(1 << 2);
    pub const PERSIST_DEST: Self = Self(1 << 3);
    pub const UNDEFINE_SOURCE: Self = Self(1 << 4);
    pub const PAUSED: Self = Self(1 << 5);
    pub const NON_SHARED_DISK: Self = Self(1 << 6);
    pub const NON_SHARED_INC: Self = Self(1 << 7);
    pub const CHANGE_PROTECTION: Self = Self(1 << 8);
    pub const UNSAFE: Self = Self(1 << 9);
    pub const OFFLINE: Self = Self(1 << 10);
    pub const COMPRESSED: Self = Self(1 << 11);
    pub const ABORT_ON_ERROR: Self = Self(1 << 12);
    pub const AUTO_CONVERGE: Self = Self(1 << 13);
    pub const RDMA_PIN_ALL: Self = Self(1 << 14);
    pub const POSTCOPY: Self = Self(1 << 15);
    pub const TLS: Self = Self(1 << 16);
    pub const PARALLEL: Self = Self(1 << 17);
    pub const NON_SHARED_SYNCHRONOUS_WRITES: Self = Self(1 << 18);
    pub const POSTCOPY_RESUME: Self = Self(1 << 19);
    pub const ZEROCOPY: Self = Self(1 << 20);

    /// Every named constant, in bit order
    pub const NAMED: &'static [(&'static str, MigrateFlags)] = &[
        ("LIVE", Self::LIVE),
        ("PEER2PEER", Self::PEER2PEER),
        ("TUNNELLED", Self::TUNNELLED),
        ("PERSIST_DEST", Self::PERSIST_DEST),
        ("UNDEFINE_SOURCE", Self::UNDEFINE_SOURCE),
        ("PAUSED", Self::PAUSED),
        ("NON_SHARED_DISK", Self::NON_SHARED_DISK),
        ("NON_SHARED_INC", Self::NON_SHARED_INC),
        ("CHANGE_PROTECTION", Self::CHANGE_PROTECTION),
        ("UNSAFE", Self::UNSAFE),
        ("OFFLINE", Self::OFFLINE),
        ("COMPRESSED", Self::COMPRESSED),
        ("ABORT_ON_ERROR", Self::ABORT_ON_ERROR),
        ("AUTO_CONVERGE", Self::AUTO_CONVERGE),
        ("RDMA_PIN_ALL", Self::RDMA_PIN_ALL),
        ("POSTCOPY", Self::POSTCOPY),
        ("TLS", Self::TLS),
        ("PARALLEL", Self::PARALLEL),
        ("NON_SHARED_SYNCHRONOUS_WRITES", Self::NON_SHARED_SYNCHRONOUS_WRITES),
        ("POSTCOPY_RESUME", Self::POSTCOPY_RESUME),
        ("ZEROCOPY", Self::ZEROCOPY),
    ];

    /// Wrap raw bits as reported by or passed to libvirt
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bit value
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when no bit is set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Look up a single constant by name, ignoring case
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == upper)
            .map(|(_, flag)| *flag)
    }

    /// OR together the constants named in `names`
    ///
    /// Stops at the first unrecognised name.
    ///
    /// # Errors
    /// Returns `FlagError::Unknown` with the upper-cased offending name
    pub fn resolve<I, S>(names: I) -> Result<Self, FlagError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = Self::NONE;
        for name in names {
            let name = name.as_ref();
            flags |= Self::from_name(name).ok_or_else(|| FlagError::Unknown(name.to_uppercase()))?;
        }
        Ok(flags)
    }

    /// Names of the set constants, in bit order
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Bits that do not correspond to any named constant
    #[must_use]
    pub fn unknown_bits(self) -> u32 {
        let known = Self::NAMED.iter().fold(0, |acc, (_, flag)| acc | flag.0);
        self.0 & !known
    }
}

impl BitOr for MigrateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MigrateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Binary for MigrateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

impl fmt::Display for MigrateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_single() {
        assert_eq!(MigrateFlags::resolve(["live"]).unwrap(), MigrateFlags::LIVE);
    }

    #[test]
    fn test_resolve_combination() {
        let flags = MigrateFlags::resolve(["live", "peer2peer", "tunnelled"]).unwrap();
        assert_eq!(
            flags,
            MigrateFlags::LIVE | MigrateFlags::PEER2PEER | MigrateFlags::TUNNELLED
        );
        assert_eq!(flags.bits(), 0b111);
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert_eq!(
            MigrateFlags::resolve(["Persist_Dest", "UNDEFINE_SOURCE"]).unwrap(),
            MigrateFlags::PERSIST_DEST | MigrateFlags::UNDEFINE_SOURCE
        );
    }

    #[test]
    fn test_resolve_empty_is_zero() {
        let names: [&str; 0] = [];
        let flags = MigrateFlags::resolve(names).unwrap();
        assert!(flags.is_empty());
        assert_eq!(flags.bits(), 0);
    }

    #[test]
    fn test_resolve_unknown_flag() {
        let err = MigrateFlags::resolve(["notaflag"]).unwrap_err();
        assert_eq!(err, FlagError::Unknown("NOTAFLAG".to_string()));
        assert_eq!(err.to_string(), "No flag \"NOTAFLAG\" exists");
    }

    #[test]
    fn test_resolve_fails_on_first_unknown() {
        let err = MigrateFlags::resolve(["live", "bogus", "offline", "alsobogus"]).unwrap_err();
        assert_eq!(err, FlagError::Unknown("BOGUS".to_string()));
    }

    #[test]
    fn test_resolve_order_independent() {
        let sets: [&[&str]; 3] = [
            &["live", "offline"],
            &["tunnelled", "peer2peer", "persist_dest"],
            &["undefine_source", "compressed", "live", "tls"],
        ];
        for names in sets {
            let forward = MigrateFlags::resolve(names.iter()).unwrap();
            let reverse = MigrateFlags::resolve(names.iter().rev()).unwrap();
            assert_eq!(forward, reverse, "{names:?}");
        }
    }

    #[test]
    fn test_names_and_display() {
        let flags = MigrateFlags::OFFLINE | MigrateFlags::LIVE;
        assert_eq!(flags.names(), vec!["LIVE", "OFFLINE"]);
        assert_eq!(flags.to_string(), "LIVE|OFFLINE");
        assert_eq!(MigrateFlags::NONE.to_string(), "NONE");
        assert_eq!(format!("{flags:b}"), "10000000001");
    }

    #[test]
    fn test_contains() {
        let flags = MigrateFlags::LIVE | MigrateFlags::PEER2PEER;
        assert!(flags.contains(MigrateFlags::LIVE));
        assert!(!flags.contains(MigrateFlags::OFFLINE));
        assert!(!flags.contains(MigrateFlags::NONE));
    }

    #[test]
    fn test_unknown_bits() {
        assert_eq!(MigrateFlags::LIVE.unknown_bits(), 0);
        assert_eq!(MigrateFlags::from_bits(1 << 30 | 1).unknown_bits(), 1 << 30);
    }
}
