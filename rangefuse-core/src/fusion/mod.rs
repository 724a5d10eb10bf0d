//! Measurement fusion pipeline
//!
//! Raw per-technology reports are smoothed by per-technology filters
//! ([`filter`]), then a [`DataFuser`] strategy decides which smoothed data
//! reaches the caller. The engine ([`engine`]) wires the two together and
//! manages filter lifecycle as technologies join and leave.

pub mod engine;
pub mod filter;

use serde::{Deserialize, Serialize};

use crate::report::RangingData;
use crate::technology::{RangingTechnology, TechnologySet};

/// Per-datum emission policy
///
/// Called once per smoothed datum with the set of technologies currently
/// contributing data. Returns the datum to deliver, or `None` to suppress it.
pub trait DataFuser: Send {
    fn fuse(&mut self, data: RangingData, active_sources: TechnologySet) -> Option<RangingData>;
}

/// Serializable fuser selection, resolved to a [`DataFuser`] at session start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Emit every datum
    Passthrough,
    /// Emit only the preferred technology's data while that technology is
    /// live, fail over to everything else the moment it drops out
    Preferential { preferred: RangingTechnology },
}

impl FusionStrategy {
    pub fn build(&self) -> Box<dyn DataFuser> {
        match self {
            FusionStrategy::Passthrough => Box::new(PassthroughFuser),
            FusionStrategy::Preferential { preferred } => Box::new(PreferentialFuser {
                preferred: *preferred,
            }),
        }
    }
}

/// Emits everything unchanged
pub struct PassthroughFuser;

impl DataFuser for PassthroughFuser {
    fn fuse(&mut self, data: RangingData, _active_sources: TechnologySet) -> Option<RangingData> {
        Some(data)
    }
}

/// Suppresses secondary technologies while the preferred one is live
///
/// Liveness is judged from the active source set, not per-datum negotiation,
/// so failover happens the instant the preferred source is deregistered.
pub struct PreferentialFuser {
    preferred: RangingTechnology,
}

impl PreferentialFuser {
    pub fn new(preferred: RangingTechnology) -> Self {
        PreferentialFuser { preferred }
    }
}

impl DataFuser for PreferentialFuser {
    fn fuse(&mut self, data: RangingData, active_sources: TechnologySet) -> Option<RangingData> {
        if !active_sources.has(self.preferred) {
            return Some(data);
        }
        if data.technologies().has(self.preferred) {
            Some(data)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{PeerAddress, RangingReport};
    use std::time::Duration;

    fn datum(technology: RangingTechnology) -> RangingData {
        RangingData::from_report(RangingReport::new(
            technology,
            PeerAddress::new(vec![0xaa]),
            Duration::from_secs(1),
            3.5,
        ))
    }

    fn both() -> TechnologySet {
        TechnologySet::UWB | TechnologySet::CS
    }

    #[test]
    fn test_passthrough_always_emits() {
        let mut fuser = PassthroughFuser;
        assert!(fuser.fuse(datum(RangingTechnology::Cs), both()).is_some());
        assert!(fuser
            .fuse(datum(RangingTechnology::Uwb), TechnologySet::empty())
            .is_some());
    }

    #[test]
    fn test_preferential_suppresses_secondary_while_preferred_live() {
        let mut fuser = PreferentialFuser::new(RangingTechnology::Uwb);

        // CS datum while UWB is an active source: suppressed
        assert!(fuser.fuse(datum(RangingTechnology::Cs), both()).is_none());

        // Same datum after UWB leaves the active set: emitted
        assert!(fuser
            .fuse(datum(RangingTechnology::Cs), TechnologySet::CS)
            .is_some());
    }

    #[test]
    fn test_preferential_emits_preferred() {
        let mut fuser = PreferentialFuser::new(RangingTechnology::Uwb);
        assert!(fuser.fuse(datum(RangingTechnology::Uwb), both()).is_some());
    }

    #[test]
    fn test_strategy_build_and_serde() {
        let strategy = FusionStrategy::Preferential {
            preferred: RangingTechnology::Uwb,
        };
        let json = serde_json::to_string(&strategy).unwrap();
        assert_eq!(json, r#"{"preferential":{"preferred":"uwb"}}"#);
        let parsed: FusionStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, strategy);

        let mut fuser = parsed.build();
        assert!(fuser.fuse(datum(RangingTechnology::Cs), both()).is_none());

        assert_eq!(
            serde_json::to_string(&FusionStrategy::Passthrough).unwrap(),
            r#""passthrough""#
        );
    }
}
