use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use url::Url;

/// 只接受 http/https，种子和磁力链接不在引擎职责内
pub fn is_valid_url(input: &str) -> bool {
    matches!(Url::parse(input), Ok(u) if u.scheme() == "http" || u.scheme() == "https")
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]+"#).expect("非法文件名正则"))
}

/// 把展示名清洗成可用的文件/目录名
pub fn sanitize_name(name: &str) -> String {
    let cleaned = unsafe_chars().replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches(['.', ' ', '_'].as_slice()).to_string();
    if cleaned.is_empty() {
        "rom".to_string()
    } else {
        cleaned
    }
}

/// 从 URL 路径里取文件名（自动丢弃查询串）
pub fn file_name_from_url(input: &str) -> Option<String> {
    let url = Url::parse(input).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(segment.to_string())
}

/// 输出文件名：优先用展示名，扩展名从 URL 补齐。
/// 展示名为空时退回 URL 文件名，再不行用时间戳兜底。
pub fn compose_output_name(display_name: &str, url: &str) -> String {
    let from_url = file_name_from_url(url);

    if display_name.trim().is_empty() {
        return from_url
            .map(|n| sanitize_name(&n))
            .unwrap_or_else(|| format!("download_{}", chrono::Utc::now().timestamp()));
    }

    let base = sanitize_name(display_name);
    if Path::new(&base).extension().is_some() {
        return base;
    }
    match from_url.as_deref().and_then(|n| Path::new(n).extension()).and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", base, ext),
        None => base,
    }
}

pub fn validate_thread_count(threads: usize) -> Result<()> {
    if threads == 0 {
        anyhow::bail!("线程数必须大于0");
    }
    if threads > 64 {
        anyhow::bail!("线程数不能超过64");
    }
    Ok(())
}
