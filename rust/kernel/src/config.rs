// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel configuration.
//!
//! Debug behaviour is carried by an explicit [`KernelConfig`] attached to each
//! [`Model`](crate::Model), so independent models (and tests) never share
//! switches.

use serde::{Deserialize, Serialize};

/// Bitmask of optional diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugFlags(u32);

impl DebugFlags {
    pub const NONE: DebugFlags = DebugFlags(0);
    pub const BOOL: DebugFlags = DebugFlags(1 << 0);
    pub const CLASSIFY: DebugFlags = DebugFlags(1 << 1);
    pub const FUSE: DebugFlags = DebugFlags(1 << 2);
    pub const MESH: DebugFlags = DebugFlags(1 << 3);
    pub const INTERSECT: DebugFlags = DebugFlags(1 << 4);
    pub const CUT: DebugFlags = DebugFlags(1 << 5);
    pub const TRI: DebugFlags = DebugFlags(1 << 6);
    pub const RT: DebugFlags = DebugFlags(1 << 7);
    pub const RADIAL: DebugFlags = DebugFlags(1 << 8);
    /// Run the consistency checker after mutating passes.
    pub const VERIFY: DebugFlags = DebugFlags(1 << 9);

    const NAMES: [(&'static str, DebugFlags); 10] = [
        ("bool", DebugFlags::BOOL),
        ("classify", DebugFlags::CLASSIFY),
        ("fuse", DebugFlags::FUSE),
        ("mesh", DebugFlags::MESH),
        ("intersect", DebugFlags::INTERSECT),
        ("cut", DebugFlags::CUT),
        ("tri", DebugFlags::TRI),
        ("rt", DebugFlags::RT),
        ("radial", DebugFlags::RADIAL),
        ("verify", DebugFlags::VERIFY),
    ];

    /// Raw bit value.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Builds flags from raw bits, dropping unknown bits.
    pub fn from_bits_truncate(bits: u32) -> Self {
        let all = Self::NAMES.iter().fold(0, |acc, (_, f)| acc | f.0);
        DebugFlags(bits & all)
    }

    /// True if every flag in `other` is set.
    pub fn contains(&self, other: DebugFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parses a comma-separated list of flag names (`"bool,verify"`) or a
    /// hexadecimal mask (`"0x201"`). Unknown names are ignored.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(Self::from_bits_truncate)
                .unwrap_or_default();
        }
        text.split(',')
            .map(|name| name.trim().to_ascii_lowercase())
            .filter_map(|name| {
                if name == "all" {
                    return Some(Self::from_bits_truncate(u32::MAX));
                }
                Self::NAMES
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, f)| *f)
            })
            .fold(Self::NONE, |acc, f| acc | f)
    }
}

impl std::ops::BitOr for DebugFlags {
    type Output = DebugFlags;

    fn bitor(self, rhs: DebugFlags) -> DebugFlags {
        DebugFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DebugFlags {
    fn bitor_assign(&mut self, rhs: DebugFlags) {
        self.0 |= rhs.0;
    }
}

/// Per-model configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Optional diagnostics.
    #[serde(default)]
    pub debug: DebugFlags,
}

impl KernelConfig {
    /// Load configuration from environment variables.
    ///
    /// `NMG_DEBUG` holds flag names or a hex mask, see [`DebugFlags::parse`].
    pub fn from_env() -> Self {
        Self {
            debug: std::env::var("NMG_DEBUG")
                .map(|v| DebugFlags::parse(&v))
                .unwrap_or_default(),
        }
    }

    /// Configuration with the given debug flags.
    pub fn with_debug(debug: DebugFlags) -> Self {
        Self { debug }
    }

    /// True when post-operation verification is enabled.
    pub fn verify(&self) -> bool {
        self.debug.contains(DebugFlags::VERIFY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        let flags = DebugFlags::parse("bool, Verify,unknown");
        assert!(flags.contains(DebugFlags::BOOL));
        assert!(flags.contains(DebugFlags::VERIFY));
        assert!(!flags.contains(DebugFlags::FUSE));
    }

    #[test]
    fn parse_hex() {
        let flags = DebugFlags::parse("0x5");
        assert!(flags.contains(DebugFlags::BOOL | DebugFlags::FUSE));
        assert!(!flags.contains(DebugFlags::CLASSIFY));
    }

    #[test]
    fn parse_all_and_garbage() {
        assert!(DebugFlags::parse("all").contains(DebugFlags::RADIAL | DebugFlags::VERIFY));
        assert_eq!(DebugFlags::parse("0xzz"), DebugFlags::NONE);
        assert_eq!(DebugFlags::from_bits_truncate(1 << 31), DebugFlags::NONE);
    }

    #[test]
    fn configs_are_independent() {
        let a = KernelConfig::with_debug(DebugFlags::VERIFY);
        let b = KernelConfig::default();
        assert!(a.verify());
        assert!(!b.verify());
    }

    #[test]
    fn config_from_json() {
        let cfg: KernelConfig = serde_json::from_str(r#"{"debug": 513}"#).unwrap();
        assert!(cfg.debug.contains(DebugFlags::BOOL));
        assert!(cfg.verify());
        let empty: KernelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, KernelConfig::default());
    }
}
