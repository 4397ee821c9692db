use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use formpilot::codegen::{CodegenOptions, ScriptFormat, generate_script};
use formpilot::hands::ChromeDriver;
use formpilot::vision;
use formpilot::{
    Credentials, Driver, FieldValue, FillerConfig, FormFiller, LaunchConfig, Navigator,
    NavigatorConfig, Overrides, RecordedAction, Recorder, RecorderConfig, RecordingSummary,
    load_actions, save_actions, smart_login,
};

#[derive(Parser)]
#[command(name = "formpilot", version, about = "Fill, navigate and record web forms")]
struct Cli {
    #[command(flatten)]
    browser: BrowserArgs,

    /// Debug-level logging (RUST_LOG still wins when set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct BrowserArgs {
    /// Run Chrome without a window.
    #[arg(long, global = true, env = "FORMPILOT_HEADLESS")]
    headless: bool,

    /// Chrome executable.
    #[arg(long, global = true, env = "FORMPILOT_CHROME")]
    chrome: Option<PathBuf>,

    /// Attach to a Chrome started with --remote-debugging-port.
    #[arg(long, global = true, env = "FORMPILOT_ATTACH")]
    attach: Option<String>,

    /// Persistent Chrome profile directory.
    #[arg(long, global = true)]
    profile: Option<PathBuf>,
}

impl BrowserArgs {
    fn launch_config(&self) -> LaunchConfig {
        let mut config = LaunchConfig::from_env();
        config.headless = self.headless;
        if let Some(path) = &self.chrome {
            config.chrome_path = Some(path.clone());
        }
        if let Some(url) = &self.attach {
            config.attach_url = Some(url.clone());
        }
        if let Some(dir) = &self.profile {
            config.user_data_dir = Some(dir.clone());
        }
        config
    }
}

#[derive(Subcommand)]
enum Command {
    /// Detect and fill every field on a page.
    Fill {
        url: String,
        /// JSON object of override values keyed by field id, name or label.
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long)]
        submit: bool,
        /// Print the form analysis before filling.
        #[arg(long)]
        analyze: bool,
        /// Walk the follow-up flow after submitting.
        #[arg(long)]
        auto_navigate: bool,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        screenshots: Option<PathBuf>,
    },
    /// Print the detected fields and a summary.
    Analyze {
        url: String,
        /// Attach hints from the vision endpoint (needs OPENAI_API_KEY).
        #[arg(long)]
        vision: bool,
        #[arg(long)]
        screenshots: Option<PathBuf>,
    },
    /// Click through agreement and continue pages until a landing page.
    Navigate {
        url: String,
        #[arg(long, default_value_t = formpilot::types::DEFAULT_MAX_STEPS)]
        max_steps: usize,
    },
    /// Log in with credentials, then auto-navigate.
    Login {
        url: String,
        #[arg(long, env = "FORMPILOT_USERNAME")]
        username: String,
        #[arg(long, env = "FORMPILOT_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value_t = formpilot::types::DEFAULT_MAX_STEPS)]
        max_steps: usize,
        #[arg(long)]
        screenshots: Option<PathBuf>,
    },
    /// Record interactions until Ctrl+C, then save the log and scripts.
    Record {
        url: String,
        #[arg(long, default_value = "recorded-actions.json")]
        out: PathBuf,
        #[arg(long)]
        keep_passwords: bool,
        #[arg(long, value_enum, default_value_t = FormatArg::Both)]
        format: FormatArg,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Regenerate scripts from a saved action log.
    Generate {
        log: PathBuf,
        #[arg(long, value_enum, default_value_t = FormatArg::Both)]
        format: FormatArg,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long)]
        no_comments: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Driver,
    SmartFiller,
    Both,
}

impl FormatArg {
    fn formats(self) -> &'static [ScriptFormat] {
        match self {
            FormatArg::Driver => &[ScriptFormat::Driver],
            FormatArg::SmartFiller => &[ScriptFormat::SmartFiller],
            FormatArg::Both => &[ScriptFormat::Driver, ScriptFormat::SmartFiller],
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "formpilot=debug" } else { "formpilot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_overrides(path: Option<&Path>) -> Result<Overrides> {
    let Some(path) = path else {
        return Ok(Overrides::new());
    };
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening override file {}", path.display()))?;
    let values: BTreeMap<String, FieldValue> = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("parsing override file {}", path.display()))?;
    Ok(values.into_iter().collect())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open(launch: &LaunchConfig, url: &str) -> Result<ChromeDriver> {
    let driver = ChromeDriver::launch(launch).context("starting Chrome")?;
    driver.goto(url).with_context(|| format!("opening {url}"))?;
    driver.wait_for_settle(Duration::from_secs(30))?;
    Ok(driver)
}

/// Run browser work off the async runtime, as the driver blocks.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow::anyhow!("browser task panicked: {e}"))?
}

fn write_scripts(
    actions: &[RecordedAction],
    format: FormatArg,
    out_dir: &Path,
    include_comments: bool,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    for &format in format.formats() {
        let options = CodegenOptions {
            include_comments,
            ..CodegenOptions::with_format(format)
        };
        let path = out_dir.join(format!("{}.rs", format.file_stem()));
        std::fs::write(&path, generate_script(actions, &options))
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Script written: {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let launch = cli.browser.launch_config();

    match cli.command {
        Command::Fill {
            url,
            data,
            submit,
            analyze,
            auto_navigate,
            seed,
            screenshots,
        } => {
            let overrides = load_overrides(data.as_deref())?;
            let config = FillerConfig {
                seed,
                screenshot_dir: screenshots,
                ..FillerConfig::default()
            };
            let (analysis, report, navigation) = blocking(move || {
                let driver = open(&launch, &url)?;
                let mut filler = FormFiller::new(&driver, config);
                let analysis = if analyze { Some(filler.analyze_form()?) } else { None };
                let report = filler.fill_form(&overrides)?;
                let mut navigation = None;
                if submit && !filler.submit(None)? {
                    warn!("No submit button found");
                } else if submit && auto_navigate {
                    navigation = Some(Navigator::new(&driver, NavigatorConfig::default()).run()?);
                }
                Ok((analysis, report, navigation))
            })
            .await?;

            if let Some(analysis) = analysis {
                print_json(&analysis)?;
            }
            print_json(&report)?;
            if let Some(navigation) = navigation {
                print_json(&navigation)?;
            }
            if !report.success {
                anyhow::bail!("no fields were filled");
            }
        }

        Command::Analyze {
            url,
            vision: use_vision,
            screenshots,
        } => {
            let shot_dir = screenshots.unwrap_or_else(std::env::temp_dir);
            let (mut fields, shot) = blocking(move || {
                let driver = open(&launch, &url)?;
                let fields = formpilot::detector::detect_fields(&driver)?;
                let shot = if use_vision {
                    Some(formpilot::filler::take_screenshot(&driver, &shot_dir, "analyze")?)
                } else {
                    None
                };
                Ok((fields, shot))
            })
            .await?;

            if let Some(shot) = shot {
                match vision::analyze_screenshot(&shot).await {
                    Ok(Some(hints)) => {
                        let merged = vision::merge_hints(&mut fields, &hints);
                        info!("Vision hints attached to {merged} fields");
                    }
                    Ok(None) => warn!("OPENAI_API_KEY not set, vision skipped"),
                    Err(e) => warn!("Vision analysis failed: {e}"),
                }
            }

            print_json(&formpilot::FormAnalysis::from_fields(&fields))?;
            print_json(&fields)?;
        }

        Command::Navigate { url, max_steps } => {
            let report = blocking(move || {
                let driver = open(&launch, &url)?;
                Ok(Navigator::new(&driver, NavigatorConfig::default()).auto_navigate(max_steps)?)
            })
            .await?;
            print_json(&report)?;
        }

        Command::Login {
            url,
            username,
            password,
            max_steps,
            screenshots,
        } => {
            let credentials = Credentials::new(username, password);
            let filler = FillerConfig {
                screenshot_dir: screenshots,
                ..FillerConfig::default()
            };
            let navigator = NavigatorConfig {
                max_steps,
                ..NavigatorConfig::default()
            };
            let report = blocking(move || {
                let driver = open(&launch, &url)?;
                Ok(smart_login(&driver, &credentials, filler, navigator)?)
            })
            .await?;
            print_json(&report)?;
            if !report.landed() {
                warn!("Did not reach a landing page");
            }
        }

        Command::Record {
            url,
            out,
            keep_passwords,
            format,
            out_dir,
        } => {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stop);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flag.store(true, Ordering::SeqCst);
                }
            });

            let config = RecorderConfig {
                keep_passwords,
                ..RecorderConfig::default()
            };
            info!("Recording on {url}. Press Ctrl+C to stop.");
            let actions = blocking(move || {
                let driver = open(&launch, &url)?;
                let mut recorder = Recorder::new(&driver, config);
                Ok(recorder.run_until(&stop)?)
            })
            .await?;

            save_actions(&out, &actions)
                .with_context(|| format!("saving action log {}", out.display()))?;
            info!("Saved {} actions to {}", actions.len(), out.display());
            println!("{}", RecordingSummary::from_actions(&actions));
            write_scripts(&actions, format, &out_dir, true)?;
        }

        Command::Generate {
            log,
            format,
            out_dir,
            no_comments,
        } => {
            if !log.exists() {
                anyhow::bail!("action log not found: {}", log.display());
            }
            let actions = load_actions(&log)
                .with_context(|| format!("loading action log {}", log.display()))?;
            println!("{}", RecordingSummary::from_actions(&actions));
            write_scripts(&actions, format, &out_dir, !no_comments)?;
        }
    }

    Ok(())
}
