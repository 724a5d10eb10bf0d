//! Fusion engines wiring filters to a fuser strategy
//!
//! An engine owns the per-technology filter state and the active source set.
//! [`feed`](FusionEngine::feed) is return-based: the caller gets the datum to
//! deliver (if any) and performs delivery itself, so the engine never holds a
//! callback that could re-enter session locks.

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::fusion::filter::{FilterTuning, SphericalFilter};
use crate::fusion::DataFuser;
use crate::report::{FusedEstimate, RangingData, RangingReport};
use crate::technology::{RangingTechnology, TechnologySet};

/// Smoothing engine: one filter per active source, then the fuser decides
pub struct FilteringFusionEngine {
    fuser: Box<dyn DataFuser>,
    filters: HashMap<RangingTechnology, SphericalFilter>,
    tuning_overrides: HashMap<RangingTechnology, FilterTuning>,
    running: bool,
}

impl FilteringFusionEngine {
    pub fn new(fuser: Box<dyn DataFuser>) -> Self {
        FilteringFusionEngine {
            fuser,
            filters: HashMap::new(),
            tuning_overrides: HashMap::new(),
            running: false,
        }
    }

    /// Replace the default tuning for filters created after this call
    pub fn set_tuning(&mut self, technology: RangingTechnology, tuning: FilterTuning) {
        self.tuning_overrides.insert(technology, tuning);
    }

    fn tuning_for(&self, technology: RangingTechnology) -> FilterTuning {
        self.tuning_overrides
            .get(&technology)
            .copied()
            .unwrap_or_else(|| FilterTuning::for_technology(technology))
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop feeding and release every filter instance
    pub fn stop(&mut self) {
        self.running = false;
        self.filters.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn add_data_source(&mut self, technology: RangingTechnology) {
        if !self.filters.contains_key(&technology) {
            let tuning = self.tuning_for(technology);
            self.filters.insert(technology, SphericalFilter::new(tuning));
            debug!("fusion: added data source {}", technology);
        }
    }

    pub fn remove_data_source(&mut self, technology: RangingTechnology) {
        if self.filters.remove(&technology).is_some() {
            debug!("fusion: removed data source {}", technology);
        }
    }

    pub fn active_sources(&self) -> TechnologySet {
        self.filters.keys().copied().collect()
    }

    /// Smooth one raw report and ask the fuser whether to emit it.
    ///
    /// Reports from technologies that are not active sources are dropped, as
    /// is anything arriving while stopped and anything from a filter still
    /// warming up.
    pub fn feed(&mut self, report: RangingReport) -> Option<RangingData> {
        if !self.running {
            trace!("fusion: dropping {} report, engine stopped", report.technology);
            return None;
        }
        let Some(filter) = self.filters.get_mut(&report.technology) else {
            warn!(
                "fusion: dropping {} report, not an active source",
                report.technology
            );
            return None;
        };

        let smoothed = filter.update(&report);
        if !filter.is_warm() {
            trace!(
                "fusion: dropping {} report, filter warming up ({} samples)",
                report.technology,
                filter.samples()
            );
            return None;
        }

        let fused = FusedEstimate {
            range_m: smoothed.range_m,
            azimuth_rad: smoothed.azimuth_rad,
            elevation_rad: smoothed.elevation_rad,
            technologies: report.technology.mask(),
        };
        let data = RangingData::from_report(smoothed).with_fused(fused);
        self.fuser.fuse(data, self.active_sources())
    }
}

/// No-op engine for sessions that range without fusing
///
/// Reports pass through unfiltered; the active source set still gates which
/// technologies may emit.
pub struct PassthroughEngine {
    sources: TechnologySet,
    running: bool,
}

impl PassthroughEngine {
    pub fn new() -> Self {
        PassthroughEngine {
            sources: TechnologySet::empty(),
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.sources = TechnologySet::empty();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn add_data_source(&mut self, technology: RangingTechnology) {
        self.sources.add(technology);
    }

    pub fn remove_data_source(&mut self, technology: RangingTechnology) {
        self.sources.drop(technology);
    }

    pub fn active_sources(&self) -> TechnologySet {
        self.sources
    }

    pub fn feed(&mut self, report: RangingReport) -> Option<RangingData> {
        if !self.running {
            trace!("fusion: dropping {} report, engine stopped", report.technology);
            return None;
        }
        if !self.sources.has(report.technology) {
            warn!(
                "fusion: dropping {} report, not an active source",
                report.technology
            );
            return None;
        }
        Some(RangingData::from_report(report))
    }
}

impl Default for PassthroughEngine {
    fn default() -> Self {
        PassthroughEngine::new()
    }
}

/// Engine selected per session from its configuration
pub enum FusionEngine {
    Passthrough(PassthroughEngine),
    Filtering(FilteringFusionEngine),
}

impl FusionEngine {
    pub fn from_config(config: &SessionConfig) -> Self {
        match config.fusion() {
            Some(fusion) => {
                FusionEngine::Filtering(FilteringFusionEngine::new(fusion.strategy.build()))
            }
            None => FusionEngine::Passthrough(PassthroughEngine::new()),
        }
    }

    pub fn start(&mut self) {
        match self {
            FusionEngine::Passthrough(engine) => engine.start(),
            FusionEngine::Filtering(engine) => engine.start(),
        }
    }

    pub fn stop(&mut self) {
        match self {
            FusionEngine::Passthrough(engine) => engine.stop(),
            FusionEngine::Filtering(engine) => engine.stop(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            FusionEngine::Passthrough(engine) => engine.is_running(),
            FusionEngine::Filtering(engine) => engine.is_running(),
        }
    }

    pub fn add_data_source(&mut self, technology: RangingTechnology) {
        match self {
            FusionEngine::Passthrough(engine) => engine.add_data_source(technology),
            FusionEngine::Filtering(engine) => engine.add_data_source(technology),
        }
    }

    pub fn remove_data_source(&mut self, technology: RangingTechnology) {
        match self {
            FusionEngine::Passthrough(engine) => engine.remove_data_source(technology),
            FusionEngine::Filtering(engine) => engine.remove_data_source(technology),
        }
    }

    pub fn active_sources(&self) -> TechnologySet {
        match self {
            FusionEngine::Passthrough(engine) => engine.active_sources(),
            FusionEngine::Filtering(engine) => engine.active_sources(),
        }
    }

    pub fn feed(&mut self, report: RangingReport) -> Option<RangingData> {
        match self {
            FusionEngine::Passthrough(engine) => engine.feed(report),
            FusionEngine::Filtering(engine) => engine.feed(report),
        }
    }
}
