// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::engines::traits::{EngineError, HttpClient, HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// 默认请求配置
///
/// 应用于通过请求通道发出的每一个请求
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    /// User-Agent
    pub user_agent: String,
    /// 默认请求头
    pub headers: HashMap<String, String>,
    /// 代理配置 (URL)
    pub proxy: Option<String>,
    /// 默认超时时间（毫秒）
    pub timeout_ms: u64,
    /// 是否跳过TLS验证
    pub skip_tls_verification: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; harvestrs/0.1; +https://github.com/Kirky-X)"
                .to_string(),
            headers: HashMap::new(),
            proxy: None,
            timeout_ms: 30_000,
            skip_tls_verification: false,
        }
    }
}

/// HTTP客户端
///
/// 基于reqwest实现，复用连接池
pub struct ReqwestClient {
    client: reqwest::Client,
    default_headers: HeaderMap,
}

impl ReqwestClient {
    /// 根据默认请求配置创建客户端
    ///
    /// # 参数
    ///
    /// * `defaults` - 默认请求配置
    ///
    /// # 返回值
    ///
    /// * `Ok(ReqwestClient)` - 客户端
    /// * `Err(EngineError)` - 代理或TLS配置无效
    pub fn new(defaults: &RequestDefaults) -> Result<Self, EngineError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(defaults.user_agent.clone())
            .timeout(Duration::from_millis(defaults.timeout_ms))
            .cookie_store(true);

        // Handle proxy
        if let Some(proxy_url) = &defaults.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| EngineError::Other(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        // Handle TLS verification
        if defaults.skip_tls_verification {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            default_headers: to_header_map(&defaults.headers),
        })
    }
}

fn to_header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        if let (Ok(k), Ok(v)) = (
            HeaderName::from_bytes(k.as_bytes()),
            HeaderValue::from_str(v),
        ) {
            map.insert(k, v);
        }
    }
    map
}

#[async_trait]
impl HttpClient for ReqwestClient {
    /// 执行HTTP请求
    ///
    /// 请求级别的请求头覆盖默认请求头
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, EngineError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| EngineError::Other(format!("Invalid method: {}", e)))?;

        let mut headers = self.default_headers.clone();
        headers.extend(to_header_map(&request.headers));

        let mut builder = self.client.request(method, &request.url).headers(headers);
        if let Some(timeout_ms) = request.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;

        let status = response.status();
        let mut response_headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                response_headers.insert(k.as_str().to_string(), v_str.to_string());
            }
        }

        let body = response.text().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers: response_headers,
            body,
        })
    }
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
