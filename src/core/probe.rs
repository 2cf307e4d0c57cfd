use std::sync::Arc;
use std::time::Duration;

use awc::http::header;

use crate::config::Settings;

/// 能力探测结果：服务器是否支持 Range 请求，以及文件总大小
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSupport {
    pub supports_range: bool,
    pub content_length: u64,
}

impl RangeSupport {
    /// 探测失败时的降级结果：按不支持 Range、大小未知处理
    pub fn unsupported() -> Self {
        Self { supports_range: false, content_length: 0 }
    }
}

/// 跳过证书校验的 rustls 配置。
/// ROM 归档站点常年挂着过期或自签证书，严格校验会把一半的源拒之门外。
struct AcceptAnyServerCert;

impl rustls::client::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

fn permissive_tls_config() -> Arc<rustls::ClientConfig> {
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    Arc::new(config)
}

/// 构建 HTTP 客户端。
/// 探测请求带超时；传输请求不设总时限（大文件下载可能跑几个小时）。
pub fn build_client(settings: &Settings, deadline: Option<Duration>) -> awc::Client {
    let connector = awc::Connector::new().rustls(permissive_tls_config());
    let builder = awc::Client::builder()
        .connector(connector)
        .max_redirects(10)
        .add_default_header((header::USER_AGENT, settings.user_agent.clone()));
    match deadline {
        Some(d) => builder.timeout(d).finish(),
        None => builder.disable_timeout().finish(),
    }
}

/// 从响应头推断 Range 能力。
/// 只有同时满足 `Accept-Ranges: bytes` 和正的 Content-Length 才算支持，
/// 缺任何一个都退回单流下载。
pub fn evaluate_headers(accept_ranges: Option<&str>, content_length: Option<&str>) -> RangeSupport {
    let length = content_length
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let ranges = accept_ranges
        .map(|s| s.trim().eq_ignore_ascii_case("bytes"))
        .unwrap_or(false);
    RangeSupport {
        supports_range: ranges && length > 0,
        content_length: length,
    }
}

/// 对 URL 发一次 HEAD 请求，探测 Range 支持和文件大小。
/// 探测失败不是致命错误，只会把策略降级为单流，所以这里从不返回 Err。
pub async fn probe_capabilities(settings: &Settings, url: &str) -> RangeSupport {
    let client = build_client(settings, Some(Duration::from_secs(settings.probe_timeout_secs)));
    let response = match client.head(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            log::warn!("能力探测失败，降级为单流下载: {} - {:?}", url, e);
            return RangeSupport::unsupported();
        }
    };

    if !response.status().is_success() {
        log::warn!("能力探测返回 {}，降级为单流下载: {}", response.status(), url);
        return RangeSupport::unsupported();
    }

    let accept_ranges = response
        .headers()
        .get(header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok());
    let content_length = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok());
    evaluate_headers(accept_ranges, content_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_supported_needs_both_headers() {
        let support = evaluate_headers(Some("bytes"), Some("800000000"));
        assert!(support.supports_range);
        assert_eq!(support.content_length, 800_000_000);
    }

    #[test]
    fn test_missing_accept_ranges_downgrades() {
        let support = evaluate_headers(None, Some("1024"));
        assert!(!support.supports_range);
        assert_eq!(support.content_length, 1024);
    }

    #[test]
    fn test_accept_ranges_none_downgrades() {
        let support = evaluate_headers(Some("none"), Some("1024"));
        assert!(!support.supports_range);
    }

    #[test]
    fn test_zero_or_missing_length_downgrades() {
        assert!(!evaluate_headers(Some("bytes"), Some("0")).supports_range);
        assert!(!evaluate_headers(Some("bytes"), None).supports_range);
        assert!(!evaluate_headers(Some("bytes"), Some("not-a-number")).supports_range);
    }

    #[test]
    fn test_accept_ranges_case_insensitive() {
        assert!(evaluate_headers(Some("Bytes"), Some("10")).supports_range);
        assert!(evaluate_headers(Some(" bytes "), Some("10")).supports_range);
    }
}
