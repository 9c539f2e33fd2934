//! Pending-query handler: given a command delivered by the sync loop,
//! resolve which tab to act on, dispatch the right action, and return
//! exactly one result on every exit path.
//!
//! The actual DOM/CDP driving is an external collaborator, modeled here
//! as the [`TabResolver`] and [`ActionExecutor`] trait objects. This
//! handler owns only the decision logic: target-tab resolution, the
//! restricted-page gate, and the dispatch table.

use crate::client::{CommandHandler, HandlerFailure};
use async_trait::async_trait;
use gasoline_commands::types::Command;
use serde_json::{json, Value};
use std::sync::Arc;

/// A resolved browser tab.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabInfo {
    /// Browser-assigned tab id.
    pub id: String,
    /// The tab's current URL.
    pub url: String,
}

/// How the acting tab was resolved, echoed back as `target_context.source`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetSource {
    /// The extension's previously tracked tab, still open.
    TrackedTab,
    /// The active tab, auto-tracked because nothing was tracked yet.
    AutoTrackedActiveTab,
    /// Some other non-internal tab in the window, auto-tracked.
    AutoTrackedRandomTab,
    /// A freshly opened tab (only for `browser_action(navigate)`).
    AutoTrackedNewTab,
}

impl TargetSource {
    /// The wire string for `target_context.source`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrackedTab => "tracked_tab",
            Self::AutoTrackedActiveTab => "auto_tracked_active_tab",
            Self::AutoTrackedRandomTab => "auto_tracked_random_tab",
            Self::AutoTrackedNewTab => "auto_tracked_new_tab",
        }
    }
}

/// Browser-facing tab queries and mutations the resolution ladder needs.
/// An out-of-scope external collaborator in production; mocked in tests.
#[async_trait]
pub trait TabResolver: Send + Sync {
    /// Look up a tab by id; `None` if it no longer exists.
    async fn tab_by_id(&self, tab_id: &str) -> Option<TabInfo>;
    /// The window's currently active tab, if any.
    async fn active_tab(&self) -> Option<TabInfo>;
    /// Any open tab whose URL is not a restricted scheme.
    async fn any_non_internal_tab(&self) -> Option<TabInfo>;
    /// Make `tab_id` the active tab.
    async fn activate(&self, tab_id: &str) -> Result<(), String>;
    /// Open a new tab at `url` and return it.
    async fn open_new_tab(&self, url: &str) -> Result<TabInfo, String>;
}

/// Performs the concrete browser action once a tab and gate decision are
/// in hand. An out-of-scope external collaborator in production; mocked in
/// tests.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// `dom` / `query_dom`.
    async fn query_dom(&self, tab: &TabInfo, params: &Value) -> Result<Value, String>;
    /// `execute` / `execute_js`.
    async fn execute_js(&self, tab: &TabInfo, params: &Value) -> Result<Value, String>;
    /// `browser_action`, with its subaction (`navigate`, `reload`, `back`,
    /// `forward`, `close`, `activate`) already split out.
    async fn browser_action(
        &self,
        tab: &TabInfo,
        subaction: &str,
        params: &Value,
    ) -> Result<Value, String>;
    /// `click` / `fill` / `highlight` / `scroll` / `keydown`.
    async fn scripted_action(&self, tab: &TabInfo, kind: &str, params: &Value) -> Result<Value, String>;
    /// The multi-stage file-attach flow. Implementers perform the
    /// read-bytes / `DataTransfer`+`change` / verify / OS-automation-fallback
    /// stages and surface the failing stage in the error if any step fails.
    async fn upload(&self, tab: &TabInfo, params: &Value) -> Result<Value, String>;
    /// Capture a screenshot, returning a URL/bytes reference.
    async fn screenshot(&self, tab: &TabInfo, params: &Value) -> Result<Value, String>;
}

fn is_restricted_url(url: &str) -> bool {
    url.starts_with("chrome://")
        || url.starts_with("edge://")
        || url.starts_with("about:")
        || url.starts_with("chrome-extension://")
        || url.starts_with("devtools://")
}

fn is_navigate(command: &Command) -> bool {
    if command.kind != "browser_action" {
        return false;
    }
    command
        .params
        .get("action")
        .and_then(Value::as_str)
        .is_some_and(|a| a == "navigate")
}

/// Resolve the tab a command should act on, per the four-step ladder
/// below. Returns the tab, how it was resolved, and — if every step
/// failed — the recovery attempts made so far.
pub async fn resolve_target(
    tracked_tab_id: Option<&str>,
    command: &Command,
    resolver: &dyn TabResolver,
) -> Result<(TabInfo, TargetSource), Vec<String>> {
    let mut attempted_recovery = Vec::new();

    if let Some(tab_id) = tracked_tab_id {
        if let Some(tab) = resolver.tab_by_id(tab_id).await {
            return Ok((tab, TargetSource::TrackedTab));
        }
        attempted_recovery.push(format!("tracked_tab:{tab_id}:missing"));
    }

    if let Some(tab) = resolver.active_tab().await {
        if !is_restricted_url(&tab.url) {
            return Ok((tab, TargetSource::AutoTrackedActiveTab));
        }
        attempted_recovery.push(format!("active_tab:{}:restricted", tab.url));
    } else {
        attempted_recovery.push("active_tab:none".to_owned());
    }

    if let Some(tab) = resolver.any_non_internal_tab().await {
        if resolver.activate(&tab.id).await.is_ok() {
            return Ok((tab, TargetSource::AutoTrackedRandomTab));
        }
        attempted_recovery.push(format!("activate:{}:failed", tab.id));
    } else {
        attempted_recovery.push("any_non_internal_tab:none".to_owned());
    }

    if is_navigate(command) {
        if let Some(url) = command.params.get("url").and_then(Value::as_str) {
            match resolver.open_new_tab(url).await {
                Ok(tab) => return Ok((tab, TargetSource::AutoTrackedNewTab)),
                Err(e) => attempted_recovery.push(format!("open_new_tab:{e}")),
            }
        }
    }

    Err(attempted_recovery)
}

/// Ties target-tab resolution, the restricted-page gate, and the dispatch
/// table together into a single [`CommandHandler`].
pub struct PendingQueryHandler {
    resolver: Arc<dyn TabResolver>,
    executor: Arc<dyn ActionExecutor>,
    tracked_tab_id: Arc<parking_lot::RwLock<Option<String>>>,
}

impl PendingQueryHandler {
    /// Construct a handler over the given resolver and executor, with an
    /// initially untracked tab.
    #[must_use]
    pub fn new(resolver: Arc<dyn TabResolver>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            resolver,
            executor,
            tracked_tab_id: Arc::new(parking_lot::RwLock::new(None)),
        }
    }

    /// The tab id currently tracked, if any.
    #[must_use]
    pub fn tracked_tab_id(&self) -> Option<String> {
        self.tracked_tab_id.read().clone()
    }

    fn remember(&self, source: TargetSource, tab: &TabInfo) {
        if matches!(
            source,
            TargetSource::AutoTrackedActiveTab
                | TargetSource::AutoTrackedRandomTab
                | TargetSource::AutoTrackedNewTab
        ) {
            *self.tracked_tab_id.write() = Some(tab.id.clone());
        }
    }

    async fn dispatch(
        &self,
        command: &Command,
        tab: &TabInfo,
    ) -> Result<Value, String> {
        match command.kind.as_str() {
            "dom" | "query_dom" => self.executor.query_dom(tab, &command.params).await,
            "execute" | "execute_js" => self.executor.execute_js(tab, &command.params).await,
            "browser_action" => {
                let subaction = command
                    .params
                    .get("action")
                    .and_then(Value::as_str)
                    .unwrap_or("navigate");
                self.executor
                    .browser_action(tab, subaction, &command.params)
                    .await
            }
            kind @ ("click" | "fill" | "highlight" | "scroll" | "keydown") => {
                self.executor.scripted_action(tab, kind, &command.params).await
            }
            "upload" => self.executor.upload(tab, &command.params).await,
            "screenshot" => self.executor.screenshot(tab, &command.params).await,
            other => Err(format!("unknown command type: {other}")),
        }
    }
}

#[async_trait]
impl CommandHandler for PendingQueryHandler {
    async fn handle(&self, command: &Command) -> Result<Value, HandlerFailure> {
        let tracked = self.tracked_tab_id();
        let (tab, source) = resolve_target(tracked.as_deref(), command, self.resolver.as_ref())
            .await
            .map_err(|attempted_recovery| HandlerFailure {
                message: "no_trackable_tab".to_owned(),
                details: Some(json!({ "attempted_recovery": attempted_recovery })),
            })?;

        self.remember(source, &tab);

        let navigate = is_navigate(command);
        if is_restricted_url(&tab.url) && !navigate {
            return Err(HandlerFailure {
                message: "csp_blocked_page".to_owned(),
                details: Some(json!({ "csp_blocked": true, "failure_cause": "csp" })),
            });
        }

        match self.dispatch(command, &tab).await {
            Ok(mut value) => {
                if let Value::Object(map) = &mut value {
                    map.entry("target_context").or_insert_with(|| {
                        json!({ "source": source.as_str(), "tab_id": tab.id })
                    });
                }
                Ok(value)
            }
            Err(message) => Err(HandlerFailure::message(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeResolver {
        tracked: Option<TabInfo>,
        active: Option<TabInfo>,
        any: Option<TabInfo>,
        opened: parking_lot::Mutex<Option<TabInfo>>,
    }

    #[async_trait]
    impl TabResolver for FakeResolver {
        async fn tab_by_id(&self, tab_id: &str) -> Option<TabInfo> {
            self.tracked
                .clone()
                .filter(|t| t.id == tab_id)
        }
        async fn active_tab(&self) -> Option<TabInfo> {
            self.active.clone()
        }
        async fn any_non_internal_tab(&self) -> Option<TabInfo> {
            self.any.clone()
        }
        async fn activate(&self, _tab_id: &str) -> Result<(), String> {
            Ok(())
        }
        async fn open_new_tab(&self, url: &str) -> Result<TabInfo, String> {
            let tab = TabInfo {
                id: "new-tab".to_owned(),
                url: url.to_owned(),
            };
            *self.opened.lock() = Some(tab.clone());
            Ok(tab)
        }
    }

    struct FakeExecutor;
    #[async_trait]
    impl ActionExecutor for FakeExecutor {
        async fn query_dom(&self, _tab: &TabInfo, _params: &Value) -> Result<Value, String> {
            Ok(json!({"matched": []}))
        }
        async fn execute_js(&self, _tab: &TabInfo, _params: &Value) -> Result<Value, String> {
            Ok(json!(2))
        }
        async fn browser_action(
            &self,
            _tab: &TabInfo,
            _subaction: &str,
            _params: &Value,
        ) -> Result<Value, String> {
            Ok(json!({"ok": true}))
        }
        async fn scripted_action(
            &self,
            _tab: &TabInfo,
            _kind: &str,
            _params: &Value,
        ) -> Result<Value, String> {
            Ok(json!({"ok": true}))
        }
        async fn upload(&self, _tab: &TabInfo, _params: &Value) -> Result<Value, String> {
            Ok(json!({"ok": true}))
        }
        async fn screenshot(&self, _tab: &TabInfo, _params: &Value) -> Result<Value, String> {
            Ok(json!({"url": "blob:x"}))
        }
    }

    fn execute_command() -> Command {
        Command {
            id: gasoline_core::ids::CommandId::new(),
            kind: "execute".to_owned(),
            params: json!({"script": "1+1"}),
            correlation_id: None,
            created_at: gasoline_core::clock::Timestamp::from_datetime(chrono::Utc::now()),
            deadline: gasoline_core::clock::Timestamp::from_datetime(chrono::Utc::now()),
            tab_id: None,
            session_id: gasoline_core::ids::SessionId::from("s1"),
        }
    }

    #[tokio::test]
    async fn tracked_tab_resolves_first() {
        let tab = TabInfo {
            id: "t1".into(),
            url: "https://example.com".into(),
        };
        let resolver = FakeResolver {
            tracked: Some(tab.clone()),
            active: None,
            any: None,
            opened: parking_lot::Mutex::new(None),
        };
        let cmd = execute_command();
        let (resolved, source) = resolve_target(Some("t1"), &cmd, &resolver).await.unwrap();
        assert_eq!(resolved, tab);
        assert_eq!(source, TargetSource::TrackedTab);
    }

    #[tokio::test]
    async fn falls_back_to_active_tab_when_untracked() {
        let tab = TabInfo {
            id: "t2".into(),
            url: "https://example.com".into(),
        };
        let resolver = FakeResolver {
            tracked: None,
            active: Some(tab.clone()),
            any: None,
            opened: parking_lot::Mutex::new(None),
        };
        let cmd = execute_command();
        let (resolved, source) = resolve_target(None, &cmd, &resolver).await.unwrap();
        assert_eq!(resolved, tab);
        assert_eq!(source, TargetSource::AutoTrackedActiveTab);
    }

    #[tokio::test]
    async fn restricted_active_tab_falls_through_to_random_tab() {
        let active = TabInfo {
            id: "restricted".into(),
            url: "chrome://extensions".into(),
        };
        let any = TabInfo {
            id: "t3".into(),
            url: "https://example.com".into(),
        };
        let resolver = FakeResolver {
            tracked: None,
            active: Some(active),
            any: Some(any.clone()),
            opened: parking_lot::Mutex::new(None),
        };
        let cmd = execute_command();
        let (resolved, source) = resolve_target(None, &cmd, &resolver).await.unwrap();
        assert_eq!(resolved, any);
        assert_eq!(source, TargetSource::AutoTrackedRandomTab);
    }

    #[tokio::test]
    async fn navigate_opens_new_tab_as_last_resort() {
        let resolver = FakeResolver {
            tracked: None,
            active: None,
            any: None,
            opened: parking_lot::Mutex::new(None),
        };
        let mut cmd = execute_command();
        cmd.kind = "browser_action".to_owned();
        cmd.params = json!({"action": "navigate", "url": "https://example.com"});
        let (resolved, source) = resolve_target(None, &cmd, &resolver).await.unwrap();
        assert_eq!(resolved.url, "https://example.com");
        assert_eq!(source, TargetSource::AutoTrackedNewTab);
    }

    #[tokio::test]
    async fn non_navigate_fails_with_no_trackable_tab_when_nothing_resolves() {
        let resolver = FakeResolver {
            tracked: None,
            active: None,
            any: None,
            opened: parking_lot::Mutex::new(None),
        };
        let cmd = execute_command();
        let err = resolve_target(None, &cmd, &resolver).await.unwrap_err();
        assert!(!err.is_empty());
    }

    #[tokio::test]
    async fn restricted_page_blocks_non_navigate_actions() {
        let tab = TabInfo {
            id: "t1".into(),
            url: "chrome://extensions".into(),
        };
        let resolver = Arc::new(FakeResolver {
            tracked: Some(tab),
            active: None,
            any: None,
            opened: parking_lot::Mutex::new(None),
        });
        let handler = PendingQueryHandler::new(resolver, Arc::new(FakeExecutor));
        *handler.tracked_tab_id.write() = Some("t1".to_owned());
        let cmd = execute_command();
        let err = handler.handle(&cmd).await.unwrap_err();
        assert_eq!(err.message, "csp_blocked_page");
        let details = err.details.unwrap();
        assert_eq!(details["csp_blocked"], true);
        assert_eq!(details["failure_cause"], "csp");
    }

    #[tokio::test]
    async fn restricted_page_allows_navigate() {
        let tab = TabInfo {
            id: "t1".into(),
            url: "chrome://extensions".into(),
        };
        let resolver = Arc::new(FakeResolver {
            tracked: Some(tab),
            active: None,
            any: None,
            opened: parking_lot::Mutex::new(None),
        });
        let handler = PendingQueryHandler::new(resolver, Arc::new(FakeExecutor));
        *handler.tracked_tab_id.write() = Some("t1".to_owned());
        let mut cmd = execute_command();
        cmd.kind = "browser_action".to_owned();
        cmd.params = json!({"action": "navigate", "url": "https://example.com"});
        let result = handler.handle(&cmd).await.unwrap();
        assert_eq!(result["target_context"]["source"], "tracked_tab");
    }

    #[tokio::test]
    async fn successful_dispatch_carries_target_context() {
        let tab = TabInfo {
            id: "t1".into(),
            url: "https://example.com".into(),
        };
        let resolver = Arc::new(FakeResolver {
            tracked: Some(tab),
            active: None,
            any: None,
            opened: parking_lot::Mutex::new(None),
        });
        let handler = PendingQueryHandler::new(resolver, Arc::new(FakeExecutor));
        *handler.tracked_tab_id.write() = Some("t1".to_owned());
        let cmd = execute_command();
        let result = handler.handle(&cmd).await.unwrap();
        assert_eq!(result["target_context"]["tab_id"], "t1");
    }

    #[tokio::test]
    async fn unresolvable_tab_fails_with_attempted_recovery() {
        let resolver = Arc::new(FakeResolver {
            tracked: None,
            active: None,
            any: None,
            opened: parking_lot::Mutex::new(None),
        });
        let handler = PendingQueryHandler::new(resolver, Arc::new(FakeExecutor));
        let cmd = execute_command();
        let err = handler.handle(&cmd).await.unwrap_err();
        assert_eq!(err.message, "no_trackable_tab");
        assert!(err.details.unwrap()["attempted_recovery"].is_array());
    }
}
