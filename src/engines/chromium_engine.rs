// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{
    Browser, BrowserLauncher, BrowserPage, DocumentResponse, EngineError, RawItem, Viewport,
};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::{BringToFrontParams, NavigateParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser as CdpBrowser, BrowserConfig, Page};
use futures::stream::BoxStream;
use futures::StreamExt;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 浏览器启动配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    /// 是否无头模式
    pub headless: bool,
    /// CDP请求超时时间（毫秒）
    pub timeout: u64,
    /// 是否禁用沙箱
    pub no_sandbox: bool,
    /// 额外的启动参数
    pub args: Vec<String>,
    /// Chrome可执行文件路径
    pub executable: Option<String>,
    /// 远程调试地址，设置后连接已有实例而不是启动新实例
    pub remote_debugging_url: Option<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: 10_000,
            no_sandbox: true,
            args: Vec::new(),
            executable: None,
            remote_debugging_url: std::env::var("CHROMIUM_REMOTE_DEBUGGING_URL").ok(),
        }
    }
}

/// 基于chromiumoxide的浏览器启动器
pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>, EngineError> {
        let (browser, mut handler) = if let Some(ref url) = self.options.remote_debugging_url {
            info!("Connecting to remote Chrome instance at: {}", url);
            CdpBrowser::connect(url).await.map_err(|e| {
                EngineError::LaunchFailed(format!("Failed to connect to remote Chrome: {}", e))
            })?
        } else {
            let mut builder = BrowserConfig::builder()
                .request_timeout(Duration::from_millis(self.options.timeout))
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage");

            if !self.options.headless {
                builder = builder.with_head();
            }
            if self.options.no_sandbox {
                builder = builder.no_sandbox();
            }
            for arg in &self.options.args {
                builder = builder.arg(arg.clone());
            }
            if let Some(ref executable) = self.options.executable {
                builder = builder.chrome_executable(executable);
            }

            let config = builder.build().map_err(EngineError::LaunchFailed)?;
            CdpBrowser::launch(config)
                .await
                .map_err(|e| EngineError::LaunchFailed(e.to_string()))?
        };

        // Spawn a handler to process browser events
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        counter!("harvestrs_browser_launches_total").increment(1);
        info!("Browser ready");

        Ok(Arc::new(ChromiumBrowser {
            inner: tokio::sync::Mutex::new(Some(browser)),
            handler: parking_lot::Mutex::new(Some(handler)),
        }))
    }
}

/// chromiumoxide浏览器实例
///
/// 页面创建在内部锁上串行执行
pub struct ChromiumBrowser {
    inner: tokio::sync::Mutex<Option<CdpBrowser>>,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, EngineError> {
        let guard = self.inner.lock().await;
        let browser = guard.as_ref().ok_or(EngineError::Closed)?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::Page(e.to_string()))?;
        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        let browser = self.inner.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let closed = browser
                    .close()
                    .await
                    .map(|_| ())
                    .map_err(|e| EngineError::Other(e.to_string()));
                if let Err(e) = browser.wait().await {
                    warn!("Browser process did not exit cleanly: {}", e);
                }
                closed
            }
            None => Ok(()),
        };

        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }
        result
    }
}

/// chromiumoxide页面
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, EngineError> {
        self.page
            .evaluate(script.as_str())
            .await
            .map_err(|e| EngineError::Evaluation(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| EngineError::Evaluation(e.to_string()))
    }
}

fn js_string(value: &str) -> String {
    // serde_json string encoding is a valid JS string literal
    serde_json::Value::String(value.to_string()).to_string()
}

fn header_map(headers: &serde_json::Value) -> HashMap<String, String> {
    headers
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.to_ascii_lowercase(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// `Page.navigate` 命令的结果
///
/// 命令有固定的30秒期限，超时说明导航仍在进行，由主文档响应和调用方的导航超时决定结果
fn navigation_outcome(url: &str, result: Result<Option<String>, CdpError>) -> Result<(), EngineError> {
    match result {
        Ok(None) => Ok(()),
        Ok(Some(error_text)) => Err(EngineError::Page(format!("{} ({})", error_text, url))),
        Err(CdpError::Timeout) => {
            debug!("Navigation command for {} still pending, waiting for document response", url);
            Ok(())
        }
        Err(e) => Err(EngineError::Page(e.to_string())),
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<(), EngineError> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                viewport.width as i64,
                viewport.height as i64,
                1.0,
                false,
            ))
            .await
            .map_err(|e| EngineError::Page(e.to_string()))?;
        Ok(())
    }

    async fn document_responses(
        &self,
    ) -> Result<BoxStream<'static, DocumentResponse>, EngineError> {
        let events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| EngineError::Page(e.to_string()))?;

        let responses = events.filter_map(|event| async move {
            if event.r#type != ResourceType::Document {
                return None;
            }
            Some(DocumentResponse {
                url: event.response.url.clone(),
                status: event.response.status as u16,
                status_text: event.response.status_text.clone(),
                headers: header_map(event.response.headers.inner()),
            })
        });
        Ok(responses.boxed())
    }

    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        let result = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map(|response| response.result.error_text);
        navigation_outcome(url, result)
    }

    async fn bring_to_front(&self) -> Result<(), EngineError> {
        self.page
            .execute(BringToFrontParams::default())
            .await
            .map_err(|e| EngineError::Page(e.to_string()))?;
        Ok(())
    }

    async fn force_same_window(&self, selector: &str) -> Result<(), EngineError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.setAttribute('target', '_self'); }} return !!el; }})()",
            js_string(selector)
        );
        self.eval::<bool>(script).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), EngineError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| EngineError::Page(format!("Click failed, element not found: {}", e)))?
            .click()
            .await
            .map_err(|e| EngineError::Page(format!("Click failed: {}", e)))?;
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize, EngineError> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        );
        self.eval(script).await
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>, EngineError> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(el => el.textContent || '')",
            js_string(selector)
        );
        self.eval(script).await
    }

    async fn item_attributes(
        &self,
        item_selector: &str,
        attributes: &[(String, String)],
    ) -> Result<Vec<RawItem>, EngineError> {
        let attributes = serde_json::to_string(attributes)
            .map_err(|e| EngineError::Evaluation(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                const attributes = {attributes};
                return Array.from(document.querySelectorAll({item})).map(itemEl => {{
                    const item = {{}};
                    attributes.forEach(([name, selector]) => {{
                        const attrEl = itemEl.querySelector(selector);
                        const value = attrEl ? attrEl.textContent : null;
                        item[name] = value ? value : null;
                    }});
                    return item;
                }});
            }})()"#,
            attributes = attributes,
            item = js_string(item_selector)
        );
        self.eval(script).await
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| EngineError::Page(e.to_string()))
    }
}
