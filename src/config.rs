//! Explicit configuration for each component, with the defaults the engine
//! was tuned against.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::{DEFAULT_MAX_STEPS, DEFAULT_STUCK_THRESHOLD};

pub const DEFAULT_ATTACH_URL: &str = "http://127.0.0.1:9222";

/// How the Chrome session is obtained.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub headless: bool,
    /// Explicit Chrome binary; searched in the usual install locations when unset.
    pub chrome_path: Option<PathBuf>,
    /// Remote debugging endpoint of an already running Chrome. Launching a
    /// fresh browser is the fallback when attaching fails.
    pub attach_url: Option<String>,
    pub window_size: (u32, u32),
    /// Persistent profile directory so logins survive between runs.
    pub user_data_dir: Option<PathBuf>,
    pub idle_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            attach_url: None,
            window_size: (1280, 900),
            user_data_dir: None,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl LaunchConfig {
    /// Defaults overlaid with `FORMPILOT_CHROME`, `FORMPILOT_HEADLESS` and
    /// `FORMPILOT_ATTACH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("FORMPILOT_CHROME") {
            if !path.trim().is_empty() {
                config.chrome_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(flag) = std::env::var("FORMPILOT_HEADLESS") {
            config.headless = parse_flag(&flag);
        }
        if let Ok(url) = std::env::var("FORMPILOT_ATTACH") {
            config.attach_url = match url.trim() {
                "" | "0" | "false" => None,
                "1" | "true" => Some(DEFAULT_ATTACH_URL.to_string()),
                other => Some(other.to_string()),
            };
        }
        config
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[derive(Debug, Clone)]
pub struct FillerConfig {
    /// Pause between fields for pages with reactive validation.
    pub field_delay: Duration,
    /// Seed for value generation and option picks; entropy when `None`.
    pub seed: Option<u64>,
    /// Where diagnostic screenshots go. No screenshots when `None`.
    pub screenshot_dir: Option<PathBuf>,
    /// How long a submit candidate may take to become visible.
    pub submit_visible_timeout: Duration,
    pub click_timeout: Duration,
    pub submit_settle: Duration,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            field_delay: Duration::from_millis(100),
            seed: None,
            screenshot_dir: None,
            submit_visible_timeout: Duration::from_millis(1000),
            click_timeout: Duration::from_secs(5),
            submit_settle: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    pub max_steps: usize,
    /// Consecutive identical URL observations, with nothing changed in
    /// between, after which the flow counts as stuck.
    pub stuck_threshold: usize,
    pub visible_timeout: Duration,
    pub enable_timeout: Duration,
    pub click_timeout: Duration,
    pub settle_timeout: Duration,
    /// URL tokens that mark a landing page outright.
    pub landing_url_tokens: Vec<String>,
    /// URL tokens that mark a page as still inside the flow.
    pub flow_url_tokens: Vec<String>,
    pub landing_text_indicators: Vec<String>,
    pub consent_vocabulary: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            stuck_threshold: DEFAULT_STUCK_THRESHOLD,
            visible_timeout: Duration::from_millis(2000),
            enable_timeout: Duration::from_millis(3000),
            click_timeout: Duration::from_millis(5000),
            settle_timeout: Duration::from_secs(10),
            landing_url_tokens: owned(&["home", "dashboard", "main"]),
            flow_url_tokens: owned(&["login", "agreement", "flow"]),
            landing_text_indicators: owned(&[
                "dashboard",
                "home",
                "welcome",
                "logged in",
                "my account",
                "profile",
                "main menu",
            ]),
            consent_vocabulary: owned(&["agree", "terms", "accept", "consent"]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Store password values in plaintext instead of `***HIDDEN***`.
    pub keep_passwords: bool,
    pub poll_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            keep_passwords: false,
            poll_interval: Duration::from_millis(500),
        }
    }
}
