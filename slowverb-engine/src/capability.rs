//! Device capability detection
//!
//! Classifies the runtime into a quality tier and initial transport from a few
//! environment signals. Detection is a pure function of those signals; reading
//! them is kept separate in [`EnvironmentSignals::from_host`].
//!
//! Unknown environments get the most conservative answer (Basic tier, media
//! element transport).

use slowverb_common::config::SlowverbConfig;
use slowverb_common::{QualityTier, TransportMode};
use tracing::info;

/// Raw signals the classification is based on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSignals {
    /// Platform identifier (`navigator.platform` style, or the OS name natively)
    pub platform: String,
    /// Number of simultaneous touch points the device supports
    pub max_touch_points: u32,
    /// Agent string
    pub user_agent: String,
}

impl EnvironmentSignals {
    pub fn new(
        platform: impl Into<String>,
        max_touch_points: u32,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            max_touch_points,
            user_agent: user_agent.into(),
        }
    }

    /// Signals for the process this engine runs in
    pub fn from_host() -> Self {
        let os = std::env::consts::OS;
        Self {
            platform: os.to_string(),
            max_touch_points: 0,
            user_agent: format!(
                "slowverb/{} ({}; {})",
                env!("CARGO_PKG_VERSION"),
                os,
                std::env::consts::ARCH
            ),
        }
    }
}

/// What the engine may use on this device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub tier: QualityTier,
    pub transport_mode: TransportMode,
    /// Largest file accepted for loading
    pub max_file_size_bytes: u64,
    /// Render quantum hint in frames (also the default device buffer size)
    pub chunk_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceClass {
    Ios,
    Mobile,
    Desktop,
    Unknown,
}

const MIB: u64 = 1024 * 1024;

const DESKTOP_PLATFORMS: &[&str] = &[
    "win32", "win64", "windows", "macintel", "macos", "linux", "freebsd", "openbsd", "netbsd",
];

fn classify(signals: &EnvironmentSignals) -> DeviceClass {
    let agent = &signals.user_agent;
    let platform = signals.platform.trim().to_ascii_lowercase();

    let ios_agent = ["iPad", "iPhone", "iPod"].iter().any(|d| agent.contains(d));
    // iPadOS reports a desktop platform but has touch
    let ipad_desktop_mode = signals.platform == "MacIntel" && signals.max_touch_points > 1;
    if ios_agent || ipad_desktop_mode || platform == "ios" {
        return DeviceClass::Ios;
    }

    if agent.contains("Android") || agent.contains("Mobi") || platform == "android" {
        return DeviceClass::Mobile;
    }

    let desktop_platform = DESKTOP_PLATFORMS.iter().any(|p| platform.starts_with(p));
    let desktop_agent = ["Windows NT", "Macintosh", "X11"]
        .iter()
        .any(|d| agent.contains(d));
    if desktop_platform || desktop_agent {
        return DeviceClass::Desktop;
    }

    DeviceClass::Unknown
}

/// Classify the environment.
///
/// Deterministic for the same signals.
pub fn detect(signals: &EnvironmentSignals) -> Capabilities {
    match classify(signals) {
        DeviceClass::Ios | DeviceClass::Unknown => Capabilities {
            tier: QualityTier::Basic,
            transport_mode: TransportMode::MediaElement,
            max_file_size_bytes: 50 * MIB,
            chunk_size: 4096,
        },
        DeviceClass::Mobile => Capabilities {
            tier: QualityTier::Medium,
            transport_mode: TransportMode::GraphNode,
            max_file_size_bytes: 150 * MIB,
            chunk_size: 2048,
        },
        DeviceClass::Desktop => Capabilities {
            tier: QualityTier::High,
            transport_mode: TransportMode::GraphNode,
            max_file_size_bytes: 500 * MIB,
            chunk_size: 1024,
        },
    }
}

/// Classify, then apply the `[engine]` and `[limits]` overrides from `config`
pub fn detect_with_config(signals: &EnvironmentSignals, config: &SlowverbConfig) -> Capabilities {
    let detected = detect(signals);
    let mut caps = detected;

    if let Some(tier) = config.engine.force_tier {
        caps.tier = tier;
        caps.transport_mode = match tier {
            QualityTier::Basic => TransportMode::MediaElement,
            _ => TransportMode::GraphNode,
        };
    }
    if let Some(mode) = config.engine.force_transport {
        caps.transport_mode = mode;
    }
    caps.max_file_size_bytes = config.max_file_size_bytes(caps.tier);

    info!(
        "Capabilities: tier={} transport={} max_file={}MiB chunk={} (detected tier {})",
        caps.tier,
        caps.transport_mode,
        caps.max_file_size_bytes / MIB,
        caps.chunk_size,
        detected.tier
    );
    caps
}
