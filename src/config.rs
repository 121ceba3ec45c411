use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lower bound on the receive timeout, so a quiet server can't make the client spin.
pub const MIN_RECV_TIMEOUT_MS: u64 = 10;

/// Race stage announced by the server operator; only logged by the driver.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    WarmUp,
    Qualifying,
    Race,
    #[default]
    Unknown,
}

impl Stage {
    /// Accepts the numeric codes used by the SCR tooling as well as names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "warm_up" | "warmup" => Some(Stage::WarmUp),
            "1" | "qualifying" => Some(Stage::Qualifying),
            "2" | "race" => Some(Stage::Race),
            "3" | "unknown" => Some(Stage::Unknown),
            _ => None,
        }
    }
}

/// Tunables of the control policy.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub steer_lock: f64,     // max wheel deflection (rad)
    pub track_pos_gain: f64,
    pub target_speed: f64,
    pub accel_step: f64,
    pub upshift_rpm: f64,
    pub downshift_rpm: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            steer_lock: 0.785398,
            track_pos_gain: 0.5,
            target_speed: 100.0,
            accel_step: 0.1,
            upshift_rpm: 7000.0,
            downshift_rpm: 3000.0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub max_episodes: u32,      // 0 = unlimited
    pub max_steps: u64,         // 0 = unlimited
    pub stage: Stage,
    pub track: Option<String>,
    pub telemetry_path: String, // "off" disables capture
    pub recv_timeout_ms: u64,
    pub policy: PolicyConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3001,
            client_id: "SCR".to_string(),
            max_episodes: 1,
            max_steps: 0,
            stage: Stage::Unknown,
            track: None,
            telemetry_path: "telemetry.csv".to_string(),
            recv_timeout_ms: 1000,
            policy: PolicyConfig::default(),
        }
    }
}

impl DriverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid config JSON in {}", path.display()))
    }

    /// File (from `DRIVER_CONFIG` or a well-known location) plus env overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var("DRIVER_CONFIG") {
            Ok(p) => Self::load(Path::new(&p))?,
            Err(_) => match resolve_config_path() {
                Some(p) => Self::load(&p)?,
                None => Self::default(),
            },
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.recv_timeout_ms < MIN_RECV_TIMEOUT_MS {
            bail!(
                "recv_timeout_ms must be at least {} (got {})",
                MIN_RECV_TIMEOUT_MS,
                self.recv_timeout_ms
            );
        }
        Ok(())
    }

    /// Receive timeout, never below [`MIN_RECV_TIMEOUT_MS`].
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms.max(MIN_RECV_TIMEOUT_MS))
    }

    pub fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("SCR_HOST") {
            self.host = v;
        }
        if let Some(v) = var("SCR_PORT") {
            self.port = v.parse().with_context(|| format!("bad SCR_PORT {:?}", v))?;
        }
        if let Some(v) = var("SCR_ID") {
            self.client_id = v;
        }
        if let Some(v) = var("MAX_EPISODES") {
            self.max_episodes = v
                .parse()
                .with_context(|| format!("bad MAX_EPISODES {:?}", v))?;
        }
        if let Some(v) = var("MAX_STEPS") {
            self.max_steps = v.parse().with_context(|| format!("bad MAX_STEPS {:?}", v))?;
        }
        if let Some(v) = var("STAGE") {
            self.stage = Stage::parse(&v).with_context(|| format!("bad STAGE {:?}", v))?;
        }
        if let Some(v) = var("TRACK_NAME") {
            self.track = Some(v);
        }
        if let Some(v) = var("TELEMETRY_PATH") {
            self.telemetry_path = v;
        }
        if let Some(v) = var("RECV_TIMEOUT_MS") {
            self.recv_timeout_ms = v
                .parse()
                .with_context(|| format!("bad RECV_TIMEOUT_MS {:?}", v))?;
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn telemetry_enabled(&self) -> bool {
        !self.telemetry_path.eq_ignore_ascii_case("off")
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("driver.json"),
        PathBuf::from("config/driver.json"),
        {
            let mut p = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
            p.pop(); // exe dir
            p.push("driver.json");
            p
        },
    ];

    candidates.into_iter().find(|c| c.exists())
}
