//! Ranging technology definitions

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Ranging technologies a session can drive.
///
/// Each variant owns one bit position so sets of technologies encode as a
/// compact bitmask (see [`TechnologySet`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangingTechnology {
    /// Ultra-Wideband time-of-flight ranging
    Uwb,
    /// Bluetooth Channel Sounding
    Cs,
}

impl RangingTechnology {
    /// All technologies, in bit order
    pub const ALL: [RangingTechnology; 2] = [RangingTechnology::Uwb, RangingTechnology::Cs];

    /// Get the technology name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RangingTechnology::Uwb => "uwb",
            RangingTechnology::Cs => "cs",
        }
    }

    /// Bit position used in the bitmask encoding
    pub fn bit(&self) -> u32 {
        match self {
            RangingTechnology::Uwb => 0,
            RangingTechnology::Cs => 1,
        }
    }

    /// Single-technology bitmask
    pub fn mask(&self) -> TechnologySet {
        TechnologySet::from_bits_truncate(1 << self.bit())
    }
}

impl std::fmt::Display for RangingTechnology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RangingTechnology {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "uwb" => Ok(RangingTechnology::Uwb),
            "cs" => Ok(RangingTechnology::Cs),
            _ => Err(format!("Unknown ranging technology: {}", s)),
        }
    }
}

impl std::str::FromStr for RangingTechnology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RangingTechnology::try_from(s)
    }
}

bitflags! {
    /// Set of ranging technologies, one bit per [`RangingTechnology`]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TechnologySet: u32 {
        const UWB = 1 << 0;
        const CS = 1 << 1;
    }
}

impl TechnologySet {
    /// Whether the set contains `tech`
    pub fn has(&self, tech: RangingTechnology) -> bool {
        self.contains(tech.mask())
    }

    /// Add `tech` to the set
    pub fn add(&mut self, tech: RangingTechnology) {
        self.insert(tech.mask());
    }

    /// Remove `tech` from the set
    pub fn drop(&mut self, tech: RangingTechnology) {
        self.remove(tech.mask());
    }

    /// Technologies in the set, in bit order
    pub fn technologies(&self) -> Vec<RangingTechnology> {
        RangingTechnology::ALL
            .iter()
            .copied()
            .filter(|t| self.has(*t))
            .collect()
    }
}

impl From<RangingTechnology> for TechnologySet {
    fn from(tech: RangingTechnology) -> Self {
        tech.mask()
    }
}

impl FromIterator<RangingTechnology> for TechnologySet {
    fn from_iter<I: IntoIterator<Item = RangingTechnology>>(iter: I) -> Self {
        let mut set = TechnologySet::empty();
        for tech in iter {
            set.add(tech);
        }
        set
    }
}

impl std::fmt::Display for TechnologySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.technologies().iter().map(|t| t.as_str()).collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

impl Serialize for TechnologySet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for TechnologySet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(TechnologySet::from_bits_truncate(bits))
    }
}

/// Availability of one technology as seen by a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnologyStatus {
    /// Not part of the session configuration
    Unused,
    /// Configured but not currently usable (radio off, unsupported, policy)
    Disabled,
    /// Configured and ready to range
    Enabled,
}

impl std::fmt::Display for TechnologyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TechnologyStatus::Unused => "unused",
            TechnologyStatus::Disabled => "disabled",
            TechnologyStatus::Enabled => "enabled",
        };
        write!(f, "{}", s)
    }
}
