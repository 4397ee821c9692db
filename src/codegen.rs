//! Script generation from a recorded action log.
//!
//! Output is a Rust program against this crate. Nothing time-dependent is
//! written, so the same log always yields the same text.

use serde::{Deserialize, Serialize};

use crate::config::NavigatorConfig;
use crate::navigator::is_landing_url;
use crate::recorder::{ElementSnapshot, RecordedAction, form_data};
use crate::types::{HIDDEN_VALUE, PASSWORD_PLACEHOLDER};

pub const EMPTY_SCRIPT: &str = "// No actions recorded";

/// Click selectors that only hit layout containers in recorded sessions.
pub const DEFAULT_NOISE_SELECTORS: &[&str] = &["flowruntimeFlowRuntime", "navigation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptFormat {
    /// One raw driver call per recorded action.
    Driver,
    /// Fill orchestrator + navigator, with literal steps only after landing.
    SmartFiller,
}

impl ScriptFormat {
    pub fn file_stem(self) -> &'static str {
        match self {
            ScriptFormat::Driver => "generated-driver-script",
            ScriptFormat::SmartFiller => "generated-smart-filler-script",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    pub format: ScriptFormat,
    pub include_comments: bool,
    /// Clicks whose selector contains any of these are dropped from the
    /// post-landing replay.
    pub noise_selectors: Vec<String>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            format: ScriptFormat::Driver,
            include_comments: true,
            noise_selectors: DEFAULT_NOISE_SELECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CodegenOptions {
    pub fn with_format(format: ScriptFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }
}

/// Rust string literal for `value`.
fn lit(value: &str) -> String {
    format!("{value:?}")
}

/// Recorded value as it should appear in a script.
fn script_value(value: &str) -> &str {
    if value == HIDDEN_VALUE { PASSWORD_PLACEHOLDER } else { value }
}

struct Script {
    out: String,
}

impl Script {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }
}

/// Non-navigation actions grouped by the URL active when they happened, in
/// first-seen order.
pub fn group_by_url(actions: &[RecordedAction]) -> Vec<(&str, Vec<&RecordedAction>)> {
    let mut groups: Vec<(&str, Vec<&RecordedAction>)> = Vec::new();
    for action in actions {
        let Some(url) = action.url() else {
            continue;
        };
        match groups.iter_mut().find(|(u, _)| *u == url) {
            Some((_, group)) => group.push(action),
            None => groups.push((url, vec![action])),
        }
    }
    groups
}

/// A submit, a click on a submit control, or a click on a login-looking button.
pub fn is_submit_like(action: &RecordedAction) -> bool {
    match action {
        RecordedAction::Submit { .. } => true,
        RecordedAction::Click { element, .. } => {
            let text = element.text.as_deref().unwrap_or_default().to_lowercase();
            element.input_type.as_deref() == Some("submit")
                || ["log in", "login", "sign in"].iter().any(|t| text.contains(t))
        }
        _ => false,
    }
}

/// Navigations and non-noise clicks after the first action recorded on a
/// landing page.
pub fn post_landing_actions<'a>(
    actions: &'a [RecordedAction],
    noise: &[String],
) -> Vec<&'a RecordedAction> {
    let config = NavigatorConfig::default();
    let Some(landing) = actions
        .iter()
        .position(|a| a.url().is_some_and(|url| is_landing_url(&config, url)))
    else {
        return Vec::new();
    };

    actions[landing + 1..]
        .iter()
        .filter(|a| match a {
            RecordedAction::Navigation { .. } => true,
            RecordedAction::Click { selector, .. } => {
                !noise.iter().any(|n| selector.selector.contains(n.as_str()))
            }
            _ => false,
        })
        .collect()
}

pub fn generate_script(actions: &[RecordedAction], options: &CodegenOptions) -> String {
    let known: Vec<RecordedAction> = actions
        .iter()
        .filter(|a| !matches!(a, RecordedAction::Unknown))
        .cloned()
        .collect();
    if known.is_empty() {
        return EMPTY_SCRIPT.to_string();
    }

    match options.format {
        ScriptFormat::Driver => driver_script(&known, options.include_comments),
        ScriptFormat::SmartFiller => smart_filler_script(&known, options),
    }
}

fn header(s: &mut Script, title: &str, total: usize, imports: &[&str]) {
    s.line(0, &format!("//! {title}"));
    s.line(0, &format!("//! Total actions: {total}"));
    s.blank();
    for import in imports {
        s.line(0, &format!("use {import};"));
    }
    s.line(0, "use std::time::Duration;");
    s.blank();
    s.line(0, "fn main() -> anyhow::Result<()> {");
    s.line(1, "let driver = ChromeDriver::launch(&LaunchConfig::from_env())?;");
    s.blank();
}

fn footer(s: &mut Script, done: &str) {
    s.line(1, &format!("println!({});", lit(done)));
    s.line(1, "Ok(())");
    s.line(0, "}");
}

fn goto(s: &mut Script, url: &str) {
    s.line(1, &format!("driver.goto({})?;", lit(url)));
    s.line(1, "driver.wait_for_settle(Duration::from_secs(10))?;");
}

fn fill_step(s: &mut Script, element: &ElementSnapshot, selector: &str, value: &str, comments: bool) {
    let sel = lit(selector);
    match element.input_type.as_deref() {
        // The click on the control is replayed instead.
        Some("checkbox" | "radio") => return,
        _ => {}
    }
    if comments {
        s.line(1, &format!("// Fill {}", element.describe()));
    }
    if element.tag_name == "select" {
        s.line(1, &format!("let options = driver.options({sel})?;"));
        s.line(
            1,
            &format!("if let Some(index) = options.iter().position(|o| o.matches({})) {{", lit(value)),
        );
        s.line(2, &format!("driver.select_index({sel}, index)?;"));
        s.line(1, "} else {");
        s.line(2, &format!("eprintln!(\"No option matching {{:?}} in {{}}\", {}, {sel});", lit(value)));
        s.line(1, "}");
    } else {
        s.line(1, &format!("driver.clear({sel})?;"));
        s.line(1, &format!("driver.type_text({sel}, {})?;", lit(script_value(value))));
    }
    s.blank();
}

fn driver_script(actions: &[RecordedAction], comments: bool) -> String {
    let mut s = Script::new();
    header(
        &mut s,
        "Generated automation script",
        actions.len(),
        &["formpilot::hands::ChromeDriver", "formpilot::{Driver, LaunchConfig}"],
    );

    for (url, group) in group_by_url(actions) {
        if comments {
            s.line(1, &format!("// Navigate to: {url}"));
        }
        goto(&mut s, url);
        s.blank();

        for action in group {
            match action {
                RecordedAction::Input {
                    selector,
                    element,
                    value,
                    ..
                } => fill_step(&mut s, element, &selector.selector, value, comments),
                RecordedAction::Click {
                    selector, element, ..
                } => {
                    if comments {
                        s.line(1, &format!("// Click {}", element.describe()));
                    }
                    s.line(
                        1,
                        &format!("driver.click({}, Duration::from_secs(5))?;", lit(&selector.selector)),
                    );
                    s.line(1, "driver.pause(Duration::from_millis(1000));");
                    s.blank();
                }
                RecordedAction::Submit { .. } => {
                    if comments {
                        s.line(1, "// Submit form");
                    }
                    s.line(
                        1,
                        &format!(
                            "driver.click({}, Duration::from_secs(5))?;",
                            lit(r#"button[type="submit"]"#)
                        ),
                    );
                    s.line(1, "driver.wait_for_settle(Duration::from_secs(10))?;");
                    s.blank();
                }
                RecordedAction::Navigation { .. } | RecordedAction::Unknown => {}
            }
        }
    }

    footer(&mut s, "Automation complete");
    s.out
}

fn smart_filler_script(actions: &[RecordedAction], options: &CodegenOptions) -> String {
    let comments = options.include_comments;
    let mut s = Script::new();
    header(
        &mut s,
        "Generated smart form filler script",
        actions.len(),
        &[
            "formpilot::hands::ChromeDriver",
            "formpilot::{Driver, FillerConfig, FormFiller, LaunchConfig, Navigator, NavigatorConfig, Overrides}",
        ],
    );

    let groups = group_by_url(actions);
    let first_url = groups.first().map(|(url, _)| *url).unwrap_or("about:blank");
    if comments {
        s.line(1, "// Navigate to starting page");
    }
    goto(&mut s, first_url);
    s.blank();

    let first_group: Vec<RecordedAction> = groups
        .first()
        .map(|(_, group)| group.iter().map(|a| (*a).clone()).collect())
        .unwrap_or_default();
    let data = form_data(&first_group);

    if comments {
        s.line(1, "// Fill form with recorded data");
    }
    s.line(1, "let mut overrides = Overrides::new();");
    for (key, value) in &data {
        s.line(
            1,
            &format!("overrides.insert({}, {});", lit(key), lit(script_value(value))),
        );
    }
    s.line(1, "let mut filler = FormFiller::new(&driver, FillerConfig::default());");
    s.line(1, "let report = filler.fill_form(&overrides)?;");
    s.line(1, r#"println!("Filled {}/{} fields", report.filled, report.total);"#);
    s.blank();

    if actions.iter().any(is_submit_like) {
        if comments {
            s.line(1, "// Submit form");
        }
        s.line(1, "filler.submit(None)?;");
        s.blank();

        if comments {
            s.line(1, "// Auto-navigate through the multi-step flow");
        }
        s.line(
            1,
            "let navigation = Navigator::new(&driver, NavigatorConfig::default()).auto_navigate(10)?;",
        );
        s.line(
            1,
            r#"println!("Navigation finished after {} steps: {:?}", navigation.steps, navigation.outcome);"#,
        );
        s.blank();

        let post = post_landing_actions(actions, &options.noise_selectors);
        if !post.is_empty() && comments {
            s.line(1, "// Post-landing actions");
        }
        for action in post {
            match action {
                RecordedAction::Navigation { to, .. } => {
                    s.line(1, &format!("println!(\"Navigating to: {{}}\", {});", lit(to)));
                    s.line(1, &format!("driver.goto({})?;", lit(to)));
                    s.line(1, "driver.wait_for_settle(Duration::from_secs(15))?;");
                    s.line(1, "driver.pause(Duration::from_millis(3000));");
                    s.blank();
                }
                RecordedAction::Click {
                    selector, element, ..
                } => {
                    let sel = lit(&selector.selector);
                    s.line(1, &format!("println!(\"Clicking: {{}}\", {});", lit(element.describe())));
                    s.line(1, &format!("let _ = driver.is_visible({sel}, Duration::from_secs(10));"));
                    s.line(1, &format!("if let Err(e) = driver.click({sel}, Duration::from_secs(5)) {{"));
                    s.line(2, r#"eprintln!("Click failed: {e}");"#);
                    s.line(1, "}");
                    s.line(1, "driver.pause(Duration::from_millis(2000));");
                    s.blank();
                }
                _ => {}
            }
        }
    }

    footer(&mut s, "Workflow complete");
    s.out
}
