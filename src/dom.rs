use crate::driver::{Driver, Query, quote};
use crate::error::DriverResult;

/// JavaScript that scans the document for fillable fields.
/// NON-DESTRUCTIVE: reads the DOM without modifying styles or layout.
///
/// The script:
///   1. Queries inputs (minus hidden/submit/button/reset/image), textareas,
///      selects, contenteditable regions and textbox/combobox roles.
///   2. Drops elements hidden by computed style or with zero-size geometry.
///   3. Resolves a label via `for=`, an enclosing label, or the nearest
///      preceding label/span/div sibling under 100 chars.
///   4. Emits one JSON object per field in the `FieldDescriptor` shape.
pub const FIELD_SCAN_JS: &str = r#"
(() => {
  const SELECTORS = [
    'input:not([type="hidden"]):not([type="submit"]):not([type="button"]):not([type="reset"]):not([type="image"])',
    'textarea',
    'select',
    '[contenteditable="true"]',
    '[role="textbox"]',
    '[role="combobox"]',
  ];
  const opt = (v) => (v === undefined || v === null || v === '' ? null : String(v));

  function isVisible(el) {
    const s = getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden' || s.opacity === '0') return false;
    if (el.offsetParent === null && s.position !== 'fixed') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  }

  function findLabel(el) {
    if (el.id) {
      const byFor = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
      if (byFor) return byFor.textContent.trim();
    }
    const parent = el.closest('label');
    if (parent) return parent.textContent.replace(el.value || '', '').trim();
    let sib = el.previousElementSibling;
    while (sib) {
      if (sib.tagName === 'LABEL') return sib.textContent.trim();
      if (sib.tagName === 'SPAN' || sib.tagName === 'DIV') {
        const t = sib.textContent.trim();
        if (t.length < 100) return t;
      }
      sib = sib.previousElementSibling;
    }
    return '';
  }

  function nearbyText(el) {
    const p = el.parentElement;
    if (!p) return '';
    return p.textContent.trim().replace(/\s+/g, ' ').slice(0, 200);
  }

  function ordinal(el) {
    let n = 1;
    let sib = el.previousElementSibling;
    while (sib) {
      if (sib.tagName === el.tagName) n++;
      sib = sib.previousElementSibling;
    }
    return n;
  }

  function kindOf(el) {
    const tag = el.tagName.toLowerCase();
    if (tag === 'input' || tag === 'textarea' || tag === 'select') return tag;
    if (el.getAttribute('contenteditable') === 'true') return 'contenteditable';
    return 'aria';
  }

  const out = [];
  document.querySelectorAll(SELECTORS.join(',')).forEach((el, index) => {
    if (!isVisible(el)) return;
    const r = el.getBoundingClientRect();
    const tag = el.tagName.toLowerCase();
    const kind = kindOf(el);
    const ml = typeof el.maxLength === 'number' && el.maxLength >= 0 ? el.maxLength : null;
    const text = (kind === 'contenteditable' || kind === 'aria')
      ? opt((el.textContent || '').trim().slice(0, 100))
      : null;
    out.push({
      index,
      kind,
      tagName: tag,
      type: tag === 'input' ? (el.type || 'text').toLowerCase() : tag,
      id: opt(el.id),
      name: opt(el.getAttribute('name')),
      placeholder: opt(el.getAttribute('placeholder')),
      ariaLabel: opt(el.getAttribute('aria-label')),
      autocomplete: opt(el.getAttribute('autocomplete')),
      className: typeof el.className === 'string' ? opt(el.className.trim()) : null,
      role: opt(el.getAttribute('role')),
      text,
      label: findLabel(el),
      context: nearbyText(el),
      value: opt(el.value),
      constraints: {
        required: !!el.required,
        disabled: !!el.disabled,
        readonly: !!el.readOnly,
        maxLength: ml,
        pattern: opt(el.getAttribute('pattern')),
        min: opt(el.getAttribute('min')),
        max: opt(el.getAttribute('max')),
      },
      rect: { x: r.x, y: r.y, width: r.width, height: r.height },
      ordinal: ordinal(el),
    });
  });
  return JSON.stringify(out);
})()
"#;

pub const BODY_TEXT_JS: &str = "document.body ? document.body.innerText : ''";

pub const TITLE_JS: &str = "document.title";

/// Readiness probe used by settle waits: document state plus the number of
/// resource-timing entries, which stops growing once the network is idle.
pub const SETTLE_PROBE_JS: &str = r#"
(() => JSON.stringify({
  ready: document.readyState,
  resources: performance.getEntriesByType('resource').length,
}))()
"#;

/// Attribute stamped on elements resolved by non-CSS queries.
pub const REF_ATTR: &str = "data-formpilot-ref";

/// Shared helpers for query resolution scripts.
const FIND_HELPERS: &str = r#"
  const visible = (el) => {
    const s = getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  };
  const textOf = (el) => ((el.innerText || el.textContent || el.value || '') + '').trim();
  const nameOf = (el) => (el.getAttribute('aria-label') || textOf(el) || el.getAttribute('title') || '').trim();
  const implicitRole = (el) => {
    const tag = el.tagName.toLowerCase();
    if (tag === 'button') return 'button';
    if (tag === 'a' && el.hasAttribute('href')) return 'link';
    if (tag === 'input') {
      const t = (el.type || '').toLowerCase();
      if (t === 'submit' || t === 'button' || t === 'reset') return 'button';
      if (t === 'checkbox') return 'checkbox';
    }
    return null;
  };
"#;

/// Build a script that locates `query`, stamps the match with a fresh
/// [`REF_ATTR`] value and returns a CSS selector for it (or `null`).
pub fn resolve_query_js(query: &Query, stamp: u64) -> String {
    let matcher = match query {
        Query::Css(css) => format!(
            "Array.from(document.querySelectorAll({})).find(visible) || document.querySelector({})",
            quote(css),
            quote(css)
        ),
        Query::ExactText(text) => format!(
            "Array.from(document.querySelectorAll('body *')).filter(visible)\
             .filter((el) => textOf(el) === {}).pop() || null",
            quote(text)
        ),
        Query::Role { role, name } => format!(
            "Array.from(document.querySelectorAll('*')).filter(visible)\
             .find((el) => (el.getAttribute('role') || implicitRole(el)) === {} \
             && nameOf(el).toLowerCase().includes({}.toLowerCase())) || null",
            quote(role),
            quote(name)
        ),
        Query::HasText { tag, text } => format!(
            "Array.from(document.querySelectorAll({})).filter(visible)\
             .filter((el) => textOf(el).toLowerCase().includes({}.toLowerCase())).pop() || null",
            quote(tag),
            quote(text)
        ),
    };
    format!(
        "(() => {{\n{FIND_HELPERS}\n  const el = {matcher};\n  if (!el) return null;\n  \
         el.setAttribute('{REF_ATTR}', '{stamp}');\n  return '[{REF_ATTR}=\"{stamp}\"]';\n}})()"
    )
}

/// Scripted click across the main document and same-origin iframes.
pub fn frame_click_js(text: &str) -> String {
    format!(
        r#"
(() => {{
  const needle = {}.toLowerCase();
  const SEL = 'button, input[type="submit"], input[type="button"], a[role="button"]';
  const buttons = Array.from(document.querySelectorAll(SEL));
  for (const frame of Array.from(document.querySelectorAll('iframe'))) {{
    try {{
      const doc = frame.contentDocument;
      if (doc) buttons.push(...Array.from(doc.querySelectorAll(SEL)));
    }} catch (e) {{}}
  }}
  const target = buttons.find((b) => ((b.textContent || b.value || '') + '').toLowerCase().includes(needle));
  if (!target) return false;
  target.click();
  return true;
}})()
"#,
        quote(text)
    )
}

/// Page title, or "untitled" when the document has none.
pub fn page_title<D: Driver + ?Sized>(driver: &D) -> DriverResult<String> {
    let value = driver.evaluate(TITLE_JS)?;
    Ok(value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| "untitled".to_string()))
}

/// First `max` characters of the page text with whitespace collapsed.
pub fn text_sample<D: Driver + ?Sized>(driver: &D, max: usize) -> String {
    driver
        .body_text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .map(|t| t.chars().take(max).collect())
        .unwrap_or_default()
}
