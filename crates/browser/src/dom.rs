//! Fixed DOM contract of the remote nesting page.
//!
//! The page must expose these selectors; everything the runner does in
//! the browser goes through them. Scripts are generated here so the
//! session code never assembles JavaScript inline.

// ---------------------------------------------------------------------------
// Selector contract
// ---------------------------------------------------------------------------

/// File input receiving the composed parts document.
pub const PARTS_INPUT: &str = "#fileinput";

/// File input receiving the composed bin document.
pub const BIN_INPUT: &str = "#bininput";

/// Control that starts the nesting run.
pub const START_BUTTON: &str = "#start";

/// Control that makes the page persist the final artifact.
pub const SEND_RESULT_BUTTON: &str = "#sendresult";

/// Live text element reporting completed iterations.
pub const INFO_ITERATIONS: &str = "#info_iterations";

/// Live text element reporting placed part count.
pub const INFO_PLACED: &str = "#info_placed";

/// Live text element reporting achieved efficiency (percent).
pub const INFO_EFFICIENCY: &str = "#info_efficiency";

/// localStorage key the page writes the final artifact into after the
/// send action.
pub const OUTPUT_STORAGE_KEY: &str = "svgOutput";

/// Name of the binding the progress observer reports through.
pub const PROGRESS_BINDING: &str = "__nestrunProgress";

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

/// Script installing a `MutationObserver` over the three progress
/// counters.
///
/// Reports every change (and the current state once, on install)
/// through [`PROGRESS_BINDING`] as a JSON payload. Returns `"ok"`, or
/// `"missing:<selector>"` if a counter element is absent — in which
/// case nothing is armed.
pub fn observer_script() -> String {
    format!(
        r#"(() => {{
    const iterations = document.querySelector("{INFO_ITERATIONS}");
    const placed = document.querySelector("{INFO_PLACED}");
    const efficiency = document.querySelector("{INFO_EFFICIENCY}");
    if (!iterations) return "missing:{INFO_ITERATIONS}";
    if (!placed) return "missing:{INFO_PLACED}";
    if (!efficiency) return "missing:{INFO_EFFICIENCY}";
    const report = () => window.{PROGRESS_BINDING}(JSON.stringify({{
        iterations: parseFloat(iterations.textContent) || 0,
        placed: parseFloat(placed.textContent) || 0,
        efficiency: parseFloat(efficiency.textContent) || 0
    }}));
    const observer = new MutationObserver(report);
    observer.observe(iterations, {{ childList: true }});
    observer.observe(placed, {{ childList: true }});
    observer.observe(efficiency, {{ childList: true }});
    report();
    return "ok";
}})()"#
    )
}

/// Script clicking the element at `selector`.
///
/// Returns `"ok"`, or `"missing:<selector>"` if it matched nothing.
pub fn click_script(selector: &str) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector("{selector}");
    if (!el) return "missing:{selector}";
    el.click();
    return "ok";
}})()"#
    )
}

/// Script reading the persisted result artifact (string or null).
pub fn read_output_script() -> String {
    format!(r#"(() => localStorage.getItem("{OUTPUT_STORAGE_KEY}"))()"#)
}
