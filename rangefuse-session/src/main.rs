//! rangefuse-demo: run a simulated ranging session from the command line
//!
//! Builds a session from flags or a JSON config file, drives it against the
//! simulated adapter factory, and streams every session event to stdout as a
//! JSON line. Useful for eyeballing the fusion pipeline and the liveness
//! timeouts without hardware.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use miette::{miette, IntoDiagnostic, Result, WrapErr};
use serde::Deserialize;
use tokio::time::sleep;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use rangefuse_core::{
    CsConfig, DeviceRole, EventScope, FusionConfig, FusionStrategy, RangingData,
    RangingParameters, RangingTechnology, SessionCallback, SessionConfig, StoppedReason,
    TechnologyConfig, TechnologySet, UwbConfig,
};
use rangefuse_session::adapter::simulated::SimulatedAdapterFactory;
use rangefuse_session::estimate::SimulatedEstimateSource;
use rangefuse_session::session::RangingSession;

#[derive(Parser, Clone, Debug)]
#[command(name = "rangefuse-demo", version, about = "Simulated multi-technology ranging session")]
struct Cli {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Technologies to range with (uwb, cs)
    #[arg(short, long, value_delimiter = ',', default_value = "uwb,cs")]
    technologies: Vec<String>,

    /// Prefer one technology's data while it is live
    #[arg(long)]
    prefer: Option<String>,

    /// Deliver raw reports without the smoothing/fusion pipeline
    #[arg(long, default_value_t = false)]
    raw: bool,

    /// Device role (controller | controlee)
    #[arg(long, default_value = "controller")]
    role: String,

    /// Stop after this many seconds (0 = run until Ctrl-C)
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    /// Max wait for the first fused datum, milliseconds
    #[arg(long, default_value_t = 3000)]
    init_timeout_ms: u64,

    /// Max gap between fused data, milliseconds
    #[arg(long, default_value_t = 2000)]
    no_update_timeout_ms: u64,

    /// Delivery pacing, milliseconds (0 = deliver immediately)
    #[arg(long, default_value_t = 0)]
    max_update_interval_ms: u64,

    /// Attach a simulated odometry estimate source
    #[arg(long, default_value_t = false)]
    odometry: bool,

    /// Read session options from a JSON file instead of flags
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Session options as read from `--config`
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DemoConfig {
    technologies: Vec<RangingTechnology>,
    #[serde(default)]
    fusion: Option<FusionStrategy>,
    #[serde(default)]
    max_update_interval_ms: u64,
    #[serde(default = "DemoConfig::default_init_timeout_ms")]
    init_timeout_ms: u64,
    #[serde(default = "DemoConfig::default_no_update_timeout_ms")]
    no_update_timeout_ms: u64,
}

impl DemoConfig {
    fn default_init_timeout_ms() -> u64 {
        SessionConfig::DEFAULT_INIT_TIMEOUT.as_millis() as u64
    }

    fn default_no_update_timeout_ms() -> u64 {
        SessionConfig::DEFAULT_NO_UPDATE_TIMEOUT.as_millis() as u64
    }

    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text)
            .into_diagnostic()
            .wrap_err_with(|| format!("parsing {}", path.display()))
    }

    fn session_config(&self) -> Result<SessionConfig> {
        let technologies: TechnologySet = self.technologies.iter().copied().collect();
        SessionConfig::new(
            technologies,
            self.fusion.is_some(),
            self.fusion.clone().map(|strategy| FusionConfig { strategy }),
            Duration::from_millis(self.max_update_interval_ms),
            Duration::from_millis(self.init_timeout_ms),
            Duration::from_millis(self.no_update_timeout_ms),
        )
        .into_diagnostic()
    }
}

impl Cli {
    /// Resolve the session options from the config file or the flags.
    fn demo_config(&self) -> Result<DemoConfig> {
        if let Some(path) = &self.config {
            return DemoConfig::load(path);
        }

        let technologies = self
            .technologies
            .iter()
            .map(|name| RangingTechnology::from_str(name).map_err(|e| miette!("{}", e)))
            .collect::<Result<Vec<_>>>()?;

        let fusion = if self.raw {
            None
        } else if let Some(name) = &self.prefer {
            let preferred = RangingTechnology::from_str(name).map_err(|e| miette!("{}", e))?;
            Some(FusionStrategy::Preferential { preferred })
        } else {
            Some(FusionStrategy::Passthrough)
        };

        Ok(DemoConfig {
            technologies,
            fusion,
            max_update_interval_ms: self.max_update_interval_ms,
            init_timeout_ms: self.init_timeout_ms,
            no_update_timeout_ms: self.no_update_timeout_ms,
        })
    }

    fn role(&self) -> Result<DeviceRole> {
        match self.role.to_ascii_lowercase().as_str() {
            "controller" => Ok(DeviceRole::Controller),
            "controlee" => Ok(DeviceRole::Controlee),
            other => Err(miette!("unknown role '{}'", other)),
        }
    }
}

/// Everything the subsystem needs, validated before the runtime starts
struct Demo {
    config: SessionConfig,
    parameters: RangingParameters,
    odometry: bool,
    run_for: Duration,
}

impl Demo {
    fn from_args(args: &Cli) -> Result<Self> {
        let config = args.demo_config()?.session_config()?;
        let configs: Vec<TechnologyConfig> = config
            .technologies()
            .technologies()
            .into_iter()
            .map(|tech| match tech {
                RangingTechnology::Uwb => TechnologyConfig::Uwb(UwbConfig::default()),
                RangingTechnology::Cs => TechnologyConfig::Cs(CsConfig::default()),
            })
            .collect();
        let parameters = RangingParameters::new(args.role()?, configs).into_diagnostic()?;
        Ok(Demo {
            config,
            parameters,
            odometry: args.odometry,
            run_for: Duration::from_secs(args.duration),
        })
    }
}

/// Prints every session event as one JSON line with a UTC timestamp
struct JsonLineCallback;

fn emit(value: serde_json::Value) {
    let mut line = serde_json::Map::new();
    line.insert(
        "time".into(),
        Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .into(),
    );
    if let serde_json::Value::Object(fields) = value {
        line.extend(fields);
    }
    println!("{}", serde_json::Value::Object(line));
}

impl SessionCallback for JsonLineCallback {
    fn on_started(&self, scope: EventScope) {
        emit(serde_json::json!({ "event": "started", "scope": scope }));
    }

    fn on_data(&self, data: RangingData) {
        emit(serde_json::json!({ "event": "data", "data": data }));
    }

    fn on_stopped(&self, scope: EventScope, reason: StoppedReason) {
        emit(serde_json::json!({ "event": "stopped", "scope": scope, "reason": reason }));
    }
}

async fn run_session(subsys: SubsystemHandle, demo: Demo) -> std::result::Result<(), std::io::Error> {
    let technologies = demo.config.technologies();
    let factory = Arc::new(SimulatedAdapterFactory::new(technologies));
    let session = RangingSession::new(demo.config, factory);

    if demo.odometry {
        if session.config().uses_fusing() {
            session.attach_estimate_source(Arc::new(SimulatedEstimateSource::new(
                Duration::from_millis(100),
                5.0,
            )));
        } else {
            log::warn!("--odometry has no effect without fusing (--raw)");
        }
    }

    let status = session.technology_status().await;
    emit(serde_json::json!({ "event": "status", "technologies": status }));

    session.start(&demo.parameters, Arc::new(JsonLineCallback));

    tokio::select! {
        _ = subsys.on_shutdown_requested() => {
            log::info!("shutdown requested");
        }
        _ = sleep(demo.run_for), if !demo.run_for.is_zero() => {
            log::info!("run duration elapsed");
        }
    }

    session.stop(StoppedReason::Requested);
    subsys.request_shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let demo = Demo::from_args(&args)?;

    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("Session", move |subsys| {
            run_session(subsys, demo)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .map_err(Into::into)
}
