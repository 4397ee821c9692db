//! Fill orchestration over one page snapshot.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::FillerConfig;
use crate::detector::detect_fields;
use crate::dom::text_sample;
use crate::driver::{Attempt, Driver, attempt, try_in_order};
use crate::error::{Diagnostics, DriverError, DriverResult, FlowError, Result};
use crate::generator::DataGenerator;
use crate::selector::selector_for;
use crate::types::{Confidence, FieldDescriptor, FieldKind, FieldValue, HIDDEN_VALUE, Overrides};

/// Characters of page text kept in failure diagnostics.
const DIAGNOSTIC_TEXT_CHARS: usize = 500;

/// Generic submit/login button patterns, tried after a caller-supplied selector.
const SUBMIT_CANDIDATES: &[&str] = &[
    r#"button[type="submit"]"#,
    r#"input[type="submit"]"#,
    r#"button:has-text("Submit")"#,
    r#"button:has-text("Login")"#,
    r#"button:has-text("Sign In")"#,
    r#"button:has-text("Log In")"#,
    r#"button:has-text("Continue")"#,
    r#"button:has-text("Next")"#,
    r#"button:has-text("Send")"#,
    r#"input[value="Submit"]"#,
    r#"input[value="Login"]"#,
    r#"input[value="Sign In"]"#,
    r#"input[value="Log In"]"#,
    "#submit",
    "#login",
    "#signin",
    "#btn-submit",
    "#btn-login",
    ".submit-button",
    ".login-button",
    ".btn-submit",
    ".btn-login",
    "form button",
    r#"form input[type="button"]"#,
];

/// What happened to one field during a fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum FieldStatus {
    Filled,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOutcome {
    pub index: usize,
    pub name: String,
    pub selector: String,
    /// Applied value as logged; passwords are masked.
    pub value: Option<String>,
    #[serde(flatten)]
    pub status: FieldStatus,
}

/// Result of [`FormFiller::fill_form`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillReport {
    pub success: bool,
    pub filled: usize,
    pub total: usize,
    pub skipped: usize,
    pub failed: usize,
    pub fields: Vec<FieldDescriptor>,
    pub outcomes: Vec<FieldOutcome>,
    pub screenshot: Option<PathBuf>,
    /// Present when the fill could not start.
    pub diagnostics: Option<Diagnostics>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub label: String,
    pub required: bool,
    pub confidence: Confidence,
}

/// Read-only overview of a page's form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormAnalysis {
    pub total_fields: usize,
    pub required_fields: usize,
    pub optional_fields: usize,
    pub field_types: BTreeMap<String, usize>,
    pub fields: Vec<FieldSummary>,
}

impl FormAnalysis {
    pub fn from_fields(fields: &[FieldDescriptor]) -> Self {
        let required_fields = fields.iter().filter(|f| f.constraints.required).count();
        let mut field_types = BTreeMap::new();
        for f in fields {
            *field_types.entry(f.detected_type.to_string()).or_insert(0) += 1;
        }
        Self {
            total_fields: fields.len(),
            required_fields,
            optional_fields: fields.len() - required_fields,
            field_types,
            fields: fields
                .iter()
                .map(|f| FieldSummary {
                    name: f.display_name().to_string(),
                    field_type: f.detected_type.to_string(),
                    label: f.label.clone(),
                    required: f.constraints.required,
                    confidence: f.confidence,
                })
                .collect(),
        }
    }
}

/// Write `<dir>/<name>-<timestamp>.png`.
pub fn take_screenshot<D: Driver + ?Sized>(driver: &D, dir: &Path, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(DriverError::Io)?;
    let stamp = Utc::now().format("%Y%m%d-%H%M%S%3f");
    let path = dir.join(format!("{name}-{stamp}.png"));
    driver.screenshot(&path)?;
    info!(target: "formpilot::filler", "[Filler] Screenshot saved: {}", path.display());
    Ok(path)
}

/// URL, a text sample and (when a directory is given) a screenshot of the
/// current page. Never fails; missing pieces are left empty.
pub fn capture_diagnostics<D: Driver + ?Sized>(
    driver: &D,
    screenshot_dir: Option<&Path>,
    name: &str,
) -> Diagnostics {
    let screenshot = screenshot_dir.and_then(|dir| match take_screenshot(driver, dir, name) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(target: "formpilot::filler", "[Filler] Diagnostic screenshot failed: {e}");
            None
        }
    });
    Diagnostics {
        url: driver.url().unwrap_or_default(),
        text_sample: text_sample(driver, DIAGNOSTIC_TEXT_CHARS),
        screenshot,
    }
}

/// Fills every discovered field on the current page, one at a time.
pub struct FormFiller<'a, D: Driver + ?Sized> {
    driver: &'a D,
    config: FillerConfig,
    generator: DataGenerator,
}

impl<'a, D: Driver + ?Sized> FormFiller<'a, D> {
    pub fn new(driver: &'a D, config: FillerConfig) -> Self {
        let generator = DataGenerator::new(config.seed);
        Self {
            driver,
            config,
            generator,
        }
    }

    pub fn config(&self) -> &FillerConfig {
        &self.config
    }

    pub fn detect_fields(&self) -> Result<Vec<FieldDescriptor>> {
        Ok(detect_fields(self.driver)?)
    }

    pub fn analyze_form(&self) -> Result<FormAnalysis> {
        let fields = detect_fields(self.driver)?;
        Ok(FormAnalysis::from_fields(&fields))
    }

    /// Detect, then fill each enabled field in document order.
    ///
    /// Per-field failures are counted and logged; only a fatal driver error
    /// aborts the run.
    pub fn fill_form(&mut self, overrides: &Overrides) -> Result<FillReport> {
        let fields = detect_fields(self.driver)?;
        if fields.is_empty() {
            warn!(target: "formpilot::filler", "[Filler] No fillable fields detected");
            let diagnostics =
                capture_diagnostics(self.driver, self.config.screenshot_dir.as_deref(), "no-fields");
            return Ok(FillReport {
                diagnostics: Some(diagnostics),
                ..FillReport::default()
            });
        }

        info!(target: "formpilot::filler", "[Filler] Filling {} fields", fields.len());
        let mut report = FillReport {
            total: fields.len(),
            ..FillReport::default()
        };

        for field in &fields {
            let selector = selector_for(field).selector;
            let name = field.display_name().to_string();

            let (status, value) = if !field.is_fillable() {
                let reason = if field.constraints.disabled { "disabled" } else { "readonly" };
                (FieldStatus::Skipped { reason: reason.into() }, None)
            } else {
                match self.fill_field(field, &selector, overrides) {
                    Ok(done) => done,
                    Err(e) if e.is_recoverable() => {
                        warn!(target: "formpilot::filler", "[Filler] {name} ({selector}) failed: {e}");
                        (FieldStatus::Failed { error: e.to_string() }, None)
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            match &status {
                FieldStatus::Filled => {
                    report.filled += 1;
                    debug!(
                        target: "formpilot::filler",
                        "[Filler] {name} <- {}",
                        value.as_deref().unwrap_or_default()
                    );
                }
                FieldStatus::Skipped { reason } => {
                    report.skipped += 1;
                    debug!(target: "formpilot::filler", "[Filler] {name} skipped: {reason}");
                }
                FieldStatus::Failed { .. } => report.failed += 1,
            }

            report.outcomes.push(FieldOutcome {
                index: field.index,
                name,
                selector,
                value,
                status,
            });
            self.driver.pause(self.config.field_delay);
        }

        info!(
            target: "formpilot::filler",
            "[Filler] Filled {}/{} fields ({} skipped, {} failed)",
            report.filled, report.total, report.skipped, report.failed
        );

        report.success = report.filled > 0;
        report.fields = fields;
        if let Some(dir) = self.config.screenshot_dir.clone() {
            match take_screenshot(self.driver, &dir, "filled") {
                Ok(path) => report.screenshot = Some(path),
                Err(e) => warn!(target: "formpilot::filler", "[Filler] Screenshot failed: {e}"),
            }
        }
        Ok(report)
    }

    /// Apply one value, dispatching on the element category.
    fn fill_field(
        &mut self,
        field: &FieldDescriptor,
        selector: &str,
        overrides: &Overrides,
    ) -> DriverResult<(FieldStatus, Option<String>)> {
        if field.kind == FieldKind::Select {
            return self.fill_select(field, selector, overrides);
        }

        let category = if field.kind == FieldKind::Input {
            field.input_type.as_str()
        } else {
            "text"
        };
        if category == "file" {
            return Ok((skipped("file input"), None));
        }

        let Some(value) = self.generator.generate(field, overrides) else {
            return Ok((skipped("no value"), None));
        };

        match category {
            "checkbox" => self.driver.set_checked(selector, value.as_bool())?,
            "radio" => self.driver.set_checked(selector, true)?,
            _ => {
                self.driver.clear(selector)?;
                self.driver.type_text(selector, &value.as_text())?;
            }
        }

        let shown = if field.is_password() {
            HIDDEN_VALUE.to_string()
        } else {
            value.as_text()
        };
        Ok((FieldStatus::Filled, Some(shown)))
    }

    /// Choose from the element's own options: an override that names an
    /// option wins, otherwise a random pick past the placeholder at index 0.
    fn fill_select(
        &mut self,
        field: &FieldDescriptor,
        selector: &str,
        overrides: &Overrides,
    ) -> DriverResult<(FieldStatus, Option<String>)> {
        let options = self.driver.options(selector)?;

        let wanted = overrides.lookup(field).map(FieldValue::as_text);
        let matched = wanted
            .as_deref()
            .and_then(|w| options.iter().position(|o| o.matches(w)));

        let index = match matched {
            Some(i) => i,
            None if options.len() > 1 => self.generator.pick_index(1..options.len()),
            None => return Ok((skipped("no choices"), None)),
        };

        self.driver.select_index(selector, index)?;
        Ok((FieldStatus::Filled, options.get(index).map(|o| o.text.clone())))
    }

    /// Click `selector` if given, else the first visible generic submit
    /// button. `Ok(false)` when nothing clickable was found.
    pub fn submit(&self, selector: Option<&str>) -> Result<bool> {
        let candidates: Vec<String> = selector
            .into_iter()
            .map(String::from)
            .chain(SUBMIT_CANDIDATES.iter().map(|s| s.to_string()))
            .collect();

        let driver = self.driver;
        let visible = self.config.submit_visible_timeout;
        let click = self.config.click_timeout;
        let attempts: Vec<Attempt<'_, ()>> = candidates
            .into_iter()
            .map(|candidate| {
                let name = candidate.clone();
                attempt(name, move || {
                    if !driver.is_visible(&candidate, visible)? {
                        return Err(DriverError::NotFound(candidate.clone()));
                    }
                    driver.click(&candidate, click)
                })
            })
            .collect();

        match try_in_order("submit", attempts) {
            Ok((winner, ())) => {
                info!(target: "formpilot::filler", "[Filler] Submitted via {winner}");
                self.driver.wait_for_settle(self.config.submit_settle)?;
                Ok(true)
            }
            Err(FlowError::Exhausted { tried, .. }) => {
                warn!(
                    target: "formpilot::filler",
                    "[Filler] No submit button found ({} candidates tried)",
                    tried.len()
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Screenshot into the configured directory; `None` when none is set.
    pub fn screenshot(&self, name: &str) -> Result<Option<PathBuf>> {
        match &self.config.screenshot_dir {
            Some(dir) => take_screenshot(self.driver, dir, name).map(Some),
            None => Ok(None),
        }
    }
}

fn skipped(reason: &str) -> FieldStatus {
    FieldStatus::Skipped {
        reason: reason.to_string(),
    }
}
