//! CDP implementation of the [`PageDriver`] port (uses the `headless_chrome` crate)

use crate::detail::DetailFetcher;
use crate::suite::SessionFactory;
use crate::{ElementHandle, Error, PageDriver, ProbeConfig, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Attribute every located node is tagged with.
const HANDLE_ATTR: &str = "data-facetprobe-handle";

/// A single Chrome tab driven over the DevTools protocol.
///
/// Located nodes are tagged with a session-unique number; a handle whose tag
/// can no longer be found on a connected node is stale. Numbers keep growing
/// across reloads so a handle never aliases a node of a later page.
pub struct CdpPage {
    browser: Browser,
    tab: Arc<Tab>,
    next_handle: AtomicU64,
}

#[derive(Deserialize)]
struct QueryReply {
    #[serde(default)]
    stale: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ids: Vec<u64>,
    #[serde(default)]
    next: u64,
}

#[derive(Deserialize)]
struct ElementReply {
    #[serde(default)]
    stale: bool,
    #[serde(default)]
    value: serde_json::Value,
}

impl CdpPage {
    /// Launch Chrome and open one tab configured from `config`.
    pub fn launch(config: &ProbeConfig) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| Error::InitializationError(format!("Failed to set user agent: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.timeout_ms));

        Ok(Self {
            browser,
            tab,
            next_handle: AtomicU64::new(1),
        })
    }

    /// Shut the browser down.
    pub fn close(self) -> Result<()> {
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }

    fn eval_json<T: for<'de> Deserialize<'de>>(&self, script: &str) -> Result<T> {
        let remote = self.tab.evaluate(script, false).map_err(|e| {
            let msg = e.to_string();
            // Navigation destroyed the execution context mid-call.
            if msg.contains("context") {
                Error::Stale(msg)
            } else {
                Error::CdpError(format!("Evaluation failed: {}", msg))
            }
        })?;

        let raw = match remote.value {
            Some(serde_json::Value::String(s)) => s,
            other => return Err(Error::CdpError(format!("Unexpected evaluation result: {:?}", other))),
        };
        serde_json::from_str(&raw).map_err(|e| Error::CdpError(format!("Malformed evaluation result: {}", e)))
    }

    /// Evaluate `expr` with `el` bound to the handle's node.
    fn on_element(&self, element: &ElementHandle, expr: &str) -> Result<serde_json::Value> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector('[{attr}="{id}"]');
                if (!el || !el.isConnected) return JSON.stringify({{ stale: true }});
                return JSON.stringify({{ stale: false, value: ({expr}) }});
            }})()"#,
            attr = HANDLE_ATTR,
            id = element.id,
            expr = expr,
        );
        let reply: ElementReply = self.eval_json(&script)?;
        if reply.stale {
            return Err(Error::Stale(element.selector.clone()));
        }
        Ok(reply.value)
    }

    fn element(&self, element: &ElementHandle) -> Result<headless_chrome::Element<'_>> {
        // Cheap staleness check first; find_element would otherwise wait out its timeout.
        self.on_element(element, "true")?;
        self.tab
            .find_element(&format!("[{}=\"{}\"]", HANDLE_ATTR, element.id))
            .map_err(|e| Error::Stale(format!("{}: {}", element.selector, e)))
    }

    fn wait_settled(&self) -> Result<()> {
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;
        Ok(())
    }
}

impl PageDriver for CdpPage {
    fn navigate(&self, url: &str) -> Result<()> {
        debug!("navigating to {}", url);
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;
        self.wait_settled()
    }

    fn reload(&self) -> Result<()> {
        debug!("reloading {}", self.tab.get_url());
        self.tab
            .reload(false, None)
            .map_err(|e| Error::LoadError(format!("Reload failed: {}", e)))?;
        self.wait_settled()
    }

    fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    fn query_all(&self, scope: Option<&ElementHandle>, selector: &str) -> Result<Vec<ElementHandle>> {
        let selector_json =
            serde_json::to_string(selector).map_err(|e| Error::Parse(format!("invalid selector: {}", e)))?;
        let scope_expr = match scope {
            Some(handle) => format!("document.querySelector('[{}=\"{}\"]')", HANDLE_ATTR, handle.id),
            None => "document".to_string(),
        };
        let start = self.next_handle.load(Ordering::SeqCst);

        let script = format!(
            r#"(() => {{
                const root = {scope};
                if (!root || (root !== document && !root.isConnected)) return JSON.stringify({{ stale: true }});
                let nodes;
                try {{ nodes = root.querySelectorAll({selector}); }}
                catch (e) {{ return JSON.stringify({{ error: String(e) }}); }}
                let next = {start};
                const ids = [];
                for (const node of nodes) {{
                    let id = node.getAttribute('{attr}');
                    if (id === null) {{ id = String(next++); node.setAttribute('{attr}', id); }}
                    ids.push(Number(id));
                }}
                return JSON.stringify({{ ids, next }});
            }})()"#,
            scope = scope_expr,
            selector = selector_json,
            start = start,
            attr = HANDLE_ATTR,
        );

        let reply: QueryReply = self.eval_json(&script)?;
        if reply.stale {
            let what = scope.map(|s| s.selector.clone()).unwrap_or_default();
            return Err(Error::Stale(what));
        }
        if let Some(err) = reply.error {
            return Err(Error::Parse(format!("invalid selector '{}': {}", selector, err)));
        }
        self.next_handle.fetch_max(reply.next, Ordering::SeqCst);

        Ok(reply.ids.into_iter().map(|id| ElementHandle::new(id, selector)).collect())
    }

    fn text(&self, element: &ElementHandle) -> Result<String> {
        let value = self.on_element(element, "el.innerText || el.textContent || ''")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let name_json = serde_json::to_string(name).map_err(|e| Error::Parse(e.to_string()))?;
        let expr = format!(
            "typeof el[{n}] === 'string' ? el[{n}] : el.getAttribute({n})",
            n = name_json
        );
        let value = self.on_element(element, &expr)?;
        Ok(value.as_str().map(str::to_string))
    }

    fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        let value = self.on_element(
            element,
            "(() => { const r = el.getBoundingClientRect(); const s = getComputedStyle(el); \
             return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; })()",
        )?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn is_enabled(&self, element: &ElementHandle) -> Result<bool> {
        let value = self.on_element(element, "!el.disabled")?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        self.element(element)?
            .click()
            .map_err(|e| Error::NotInteractable(format!("{}: {}", element.selector, e)))?;
        Ok(())
    }

    fn hover(&self, element: &ElementHandle) -> Result<()> {
        self.element(element)?
            .move_mouse_over()
            .map_err(|e| Error::NotInteractable(format!("{}: {}", element.selector, e)))?;
        Ok(())
    }

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.on_element(element, "(el.scrollIntoView(false), true)")?;
        Ok(())
    }

    fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.element(element)?
            .type_into(text)
            .map_err(|e| Error::NotInteractable(format!("{}: {}", element.selector, e)))?;
        Ok(())
    }

    fn screenshot_png(&self) -> Result<Vec<u8>> {
        let data = self
            .tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)?;
        Ok(data)
    }
}

/// Opens a fresh Chrome per case and fetches details over HTTP.
pub struct CdpSessionFactory;

impl SessionFactory for CdpSessionFactory {
    type Driver = CdpPage;
    type Details = DetailFetcher;

    fn open_session(&self, config: &ProbeConfig) -> Result<CdpPage> {
        CdpPage::launch(config).map_err(|e| {
            warn!("could not open browser session: {}", e);
            e
        })
    }

    fn detail_source(&self, config: &ProbeConfig) -> Result<DetailFetcher> {
        DetailFetcher::new(config)
    }
}
