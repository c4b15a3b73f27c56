use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::sources::QuietHours;
use crate::weather::Units;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. Every source section is optional; a
/// missing section means that poller is never spawned.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub display: Option<DisplayConfig>,
    pub quiet_hours: Option<QuietConfig>,
    pub spotify: Option<SpotifyConfig>,
    pub cast: Option<CastConfig>,
    pub plex: Option<PlexConfig>,
    pub heos: Option<HeosConfig>,
    pub weather: Option<WeatherConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplayConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub gamma: Option<f32>,
    pub framebuffer: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuietConfig {
    /// Whole hours, local time; start == end disables the window.
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpotifyConfig {
    pub token_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CastConfig {
    pub status_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlexConfig {
    pub url: String,
    pub token: String,
    /// Restrict to a named player; any player when unset.
    pub player: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeosConfig {
    pub host: String,
    pub pid: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeatherConfig {
    pub api_key: String,
    pub lat: f64,
    pub lon: f64,
    /// "imperial" (default) or "metric"
    pub units: Option<String>,
}

impl Config {
    pub fn quiet_hours(&self) -> Option<QuietHours> {
        self.quiet_hours.as_ref().map(|q| QuietHours {
            start: q.start,
            end: q.end,
        })
    }
}

impl WeatherConfig {
    pub fn units(&self) -> Units {
        match self.units.as_deref() {
            Some("metric") => Units::Metric,
            _ => Units::Imperial,
        }
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "nowglow", about = "now playing, in lights", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    #[arg(long)]
    pub display_width: Option<u32>,
    #[arg(long)]
    pub display_height: Option<u32>,
    #[arg(long)]
    pub display_gamma: Option<f32>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub framebuffer: Option<PathBuf>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_with(&cli)?;
    if cli.dump_config {
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }
    Ok(cfg)
}

fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    if let Some(home) = home_dir() {
        let p = home.join(".config/nowglow/config.yaml");
        if p.exists() {
            return Some(p);
        }
        let p = home.join(".config/nowglow.yaml");
        if p.exists() {
            return Some(p);
        }
    }
    for candidate in &["nowglow.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, section by section.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some() {
        dst.log_level = src.log_level;
    }
    if src.cache_dir.is_some() {
        dst.cache_dir = src.cache_dir;
    }
    match (&mut dst.display, src.display) {
        (None, Some(c)) => dst.display = Some(c),
        (Some(d), Some(s)) => merge_display(d, s),
        _ => {}
    }
    if src.quiet_hours.is_some() {
        dst.quiet_hours = src.quiet_hours;
    }
    if src.spotify.is_some() {
        dst.spotify = src.spotify;
    }
    if src.cast.is_some() {
        dst.cast = src.cast;
    }
    if src.plex.is_some() {
        dst.plex = src.plex;
    }
    if src.heos.is_some() {
        dst.heos = src.heos;
    }
    if src.weather.is_some() {
        dst.weather = src.weather;
    }
}

fn merge_display(dst: &mut DisplayConfig, src: DisplayConfig) {
    if src.width.is_some() {
        dst.width = src.width;
    }
    if src.height.is_some() {
        dst.height = src.height;
    }
    if src.gamma.is_some() {
        dst.gamma = src.gamma;
    }
    if src.framebuffer.is_some() {
        dst.framebuffer = src.framebuffer;
    }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some() {
        cfg.log_level = cli.log_level.clone();
    }
    if cli.cache_dir.is_some() {
        cfg.cache_dir = cli.cache_dir.clone();
    }
    let any_display = cli.display_width.is_some()
        || cli.display_height.is_some()
        || cli.display_gamma.is_some()
        || cli.framebuffer.is_some();
    if any_display && cfg.display.is_none() {
        cfg.display = Some(DisplayConfig::default());
    }
    if let Some(display) = cfg.display.as_mut() {
        if cli.display_width.is_some() {
            display.width = cli.display_width;
        }
        if cli.display_height.is_some() {
            display.height = cli.display_height;
        }
        if cli.display_gamma.is_some() {
            display.gamma = cli.display_gamma;
        }
        if cli.framebuffer.is_some() {
            display.framebuffer = cli.framebuffer.clone();
        }
    }
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(display) = cfg.display.as_ref() {
        if let (Some(w), Some(h)) = (display.width, display.height) {
            if w == 0 || h == 0 {
                return Err(ConfigError::Validation(
                    "display width/height must be > 0".into(),
                ));
            }
        }
        if let Some(g) = display.gamma {
            if !(0.5..=4.0).contains(&g) {
                return Err(ConfigError::Validation(
                    "display gamma must be within 0.5..=4.0".into(),
                ));
            }
        }
    }
    if let Some(q) = cfg.quiet_hours.as_ref() {
        if q.start > 23 || q.end > 23 {
            return Err(ConfigError::Validation(
                "quiet_hours start/end must be hours 0..=23".into(),
            ));
        }
    }
    if let Some(w) = cfg.weather.as_ref() {
        if w.api_key.is_empty() {
            return Err(ConfigError::Validation("weather api_key is required".into()));
        }
        if !(-90.0..=90.0).contains(&w.lat) || !(-180.0..=180.0).contains(&w.lon) {
            return Err(ConfigError::Validation("weather lat/lon out of range".into()));
        }
        if let Some(u) = w.units.as_deref() {
            if u != "imperial" && u != "metric" {
                return Err(ConfigError::Validation(
                    "weather units must be imperial|metric".into(),
                ));
            }
        }
    }
    if let Some(p) = cfg.plex.as_ref() {
        if p.url.is_empty() || p.token.is_empty() {
            return Err(ConfigError::Validation("plex url and token are required".into()));
        }
    }
    if let Some(h) = cfg.heos.as_ref() {
        if h.host.is_empty() {
            return Err(ConfigError::Validation("heos host is required".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("nowglow").chain(args.iter().copied()))
    }

    fn write_yaml(dir: &Path, body: &str) -> PathBuf {
        let p = dir.join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        p
    }

    #[test]
    fn test_yaml_then_cli_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_yaml(
            dir.path(),
            "log_level: info\ndisplay:\n  width: 64\n  height: 64\n  gamma: 2.2\n",
        );
        let cli = cli(&[
            "--config",
            p.to_str().unwrap(),
            "--log-level",
            "debug",
            "--display-gamma",
            "1.8",
        ]);
        let cfg = load_with(&cli).unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        let d = cfg.display.unwrap();
        assert_eq!(d.width, Some(64));
        assert_eq!(d.gamma, Some(1.8));
    }

    #[test]
    fn test_source_sections_deserialize() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_yaml(
            dir.path(),
            concat!(
                "spotify:\n  token_path: /tmp/tok.json\n",
                "plex:\n  url: http://plex:32400\n  token: abc\n  player: den\n",
                "heos:\n  host: 10.0.0.9\n  pid: 7\n",
                "quiet_hours:\n  start: 23\n  end: 6\n",
            ),
        );
        let cfg = load_with(&cli(&["--config", p.to_str().unwrap()])).unwrap();
        assert!(cfg.spotify.is_some());
        assert_eq!(cfg.plex.as_ref().unwrap().player.as_deref(), Some("den"));
        let quiet = cfg.quiet_hours().unwrap();
        assert_eq!((quiet.start, quiet.end), (23, 6));
    }

    #[test]
    fn test_validation_rejects_bad_gamma() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_yaml(dir.path(), "display:\n  width: 64\n  height: 64\n  gamma: 9.0\n");
        let err = load_with(&cli(&["--config", p.to_str().unwrap()])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let err = load_with(&cli(&["--config", "/nonexistent/nowglow.yaml"])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_units_mapping_defaults_imperial() {
        let w = WeatherConfig {
            api_key: "k".into(),
            lat: 0.0,
            lon: 0.0,
            units: None,
        };
        assert_eq!(w.units(), Units::Imperial);
        let m = WeatherConfig {
            units: Some("metric".into()),
            ..w
        };
        assert_eq!(m.units(), Units::Metric);
    }
}
