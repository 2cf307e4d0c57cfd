use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use awc::http::StatusCode;
use futures::StreamExt;

use crate::config::Settings;
use crate::core::error::DownloadError;
use crate::core::probe::build_client;

use super::chunks::ChunkProgress;
use super::util::PositionedWriter;

const CHUNK_WRITE_BUFFER: usize = 256 * 1024;
const STREAM_WRITE_BUFFER: usize = 1024 * 1024;

/// 等帧时的标志轮询间隔。
/// 传输没有总时限，但暂停/取消必须在一个轮询周期内关掉 socket，
/// 即使服务器卡住一帧都不发。
const FLAG_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 分块请求的 Range 头：闭区间
pub fn chunk_range_header(start: u64, end: u64) -> String {
    format!("bytes={}-{}", start, end)
}

/// 单流续传的开区间 Range 头
pub fn open_range_header(offset: u64) -> String {
    format!("bytes={}-", offset)
}

/// 任务级控制标志，所有抓取协程共享。
/// 暂停与取消分开：取消要删文件，暂停要保住已落盘的字节。
#[derive(Clone)]
pub struct TransferFlags {
    pub paused: Arc<AtomicBool>,
    pub cancelled: Arc<AtomicBool>,
}

impl TransferFlags {
    pub fn new() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 在每个挂起点检查：任务取消 > 任务暂停 > 本块中止
    fn check(&self, chunk_abort: Option<&AtomicBool>) -> Result<(), DownloadError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(DownloadError::Cancelled);
        }
        if self.paused.load(Ordering::Acquire) {
            return Err(DownloadError::Paused);
        }
        if let Some(flag) = chunk_abort {
            if flag.load(Ordering::Acquire) {
                return Err(DownloadError::Cancelled);
            }
        }
        Ok(())
    }
}

impl Default for TransferFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// 等响应头，期间按固定间隔重查标志。
/// 超时分支丢弃请求 future，连接随之关闭，取消不会悬在握手上。
async fn await_response<F, T, E>(
    mut fut: F,
    flags: &TransferFlags,
    chunk_abort: Option<&AtomicBool>,
) -> Result<T, DownloadError>
where
    F: std::future::Future<Output = Result<T, E>> + Unpin,
    E: std::fmt::Debug,
{
    loop {
        match tokio::time::timeout(FLAG_POLL_INTERVAL, &mut fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => return Err(DownloadError::NetworkError(format!("{:?}", e))),
            Err(_elapsed) => flags.check(chunk_abort)?,
        }
    }
}

/// 等下一个数据帧，期间按固定间隔重查标志
async fn next_frame<S>(
    stream: &mut S,
    flags: &TransferFlags,
    chunk_abort: Option<&AtomicBool>,
) -> Result<Option<bytes::Bytes>, DownloadError>
where
    S: futures::Stream<Item = Result<bytes::Bytes, awc::error::PayloadError>> + Unpin,
{
    loop {
        flags.check(chunk_abort)?;
        match tokio::time::timeout(FLAG_POLL_INTERVAL, stream.next()).await {
            Ok(Some(Ok(frame))) => return Ok(Some(frame)),
            Ok(Some(Err(e))) => {
                return Err(DownloadError::NetworkError(format!("{:?}", e)));
            }
            Ok(None) => return Ok(None),
            // 这一轮没等到数据，回头再查一遍标志
            Err(_elapsed) => continue,
        }
    }
}

/// 抓取一个分块：对 `[resume_offset, end]` 发 Range 请求，
/// 响应流直接定位写入共享目标文件。
///
/// 标志在发请求前、拿到响应后、以及每个数据帧上都要查；
/// 所有退出路径都先把缓冲刷盘，`downloaded` 计数才与磁盘一致，
/// 恢复时才能精确续传。
pub async fn fetch_chunk(
    settings: &Settings,
    url: &str,
    path: &Path,
    chunk: &ChunkProgress,
    flags: &TransferFlags,
) -> Result<(), DownloadError> {
    let resume_from = chunk.resume_offset();
    if resume_from > chunk.end {
        return Ok(());
    }
    flags.check(Some(&chunk.cancelled))?;

    let client = build_client(settings, None);
    let request = client
        .get(url)
        .insert_header(("Range", chunk_range_header(resume_from, chunk.end)));
    let mut response = await_response(request.send(), flags, Some(&chunk.cancelled)).await?;

    flags.check(Some(&chunk.cancelled))?;

    match response.status() {
        StatusCode::PARTIAL_CONTENT => {}
        // 200 意味着服务器无视了 Range，整个任务要回退成单流
        StatusCode::OK => return Err(DownloadError::RangeIgnored),
        status => return Err(DownloadError::ServerError(format!("服务器错误: {}", status))),
    }

    let mut writer = PositionedWriter::open(path, resume_from, CHUNK_WRITE_BUFFER)?;
    loop {
        let frame = match next_frame(&mut response, flags, Some(&chunk.cancelled)).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(stop) => {
                // 中断前缓冲落盘，计数器保持可续传
                writer.flush()?;
                return Err(stop);
            }
        };

        // 防御越界：行为异常的服务器多给的字节绝不能写进相邻分块的区间
        let want = chunk.len() - chunk.bytes_downloaded();
        if want == 0 {
            break;
        }
        let frame = if (frame.len() as u64) > want {
            frame.slice(..want as usize)
        } else {
            frame
        };

        writer.write(&frame)?;
        chunk.downloaded.fetch_add(frame.len() as u64, Ordering::AcqRel);
    }
    writer.flush()?;

    if !chunk.is_complete() {
        return Err(DownloadError::SizeMismatch {
            expected: chunk.len(),
            actual: chunk.bytes_downloaded(),
        });
    }
    Ok(())
}

/// 单流抓取整个文件（或从 `resume_from` 续传到结尾）。
/// 返回传输结束后文件应有的总字节数。
pub async fn fetch_single(
    settings: &Settings,
    url: &str,
    path: &Path,
    resume_from: u64,
    expected_total: u64,
    flags: &TransferFlags,
) -> Result<u64, DownloadError> {
    flags.check(None)?;

    let client = build_client(settings, None);
    let request = client.get(url);
    let request = if resume_from > 0 {
        request.insert_header(("Range", open_range_header(resume_from)))
    } else {
        request
    };
    let mut response = await_response(request.send(), flags, None).await?;

    flags.check(None)?;

    if resume_from > 0 {
        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            // 续传要求 206；200 等于从零重发，绝不悄悄接受
            StatusCode::OK => {
                return Err(DownloadError::ResumeNotSupported(
                    "服务器忽略了 Range 请求，无法从断点继续".to_string(),
                ))
            }
            status => return Err(DownloadError::ServerError(format!("服务器错误: {}", status))),
        }
    } else if !response.status().is_success() {
        return Err(DownloadError::ServerError(format!("服务器错误: {}", response.status())));
    }

    let mut file = if resume_from > 0 {
        OpenOptions::new().write(true).append(true).open(path)?
    } else {
        OpenOptions::new().write(true).create(true).truncate(true).open(path)?
    };

    let mut buffer: Vec<u8> = Vec::with_capacity(STREAM_WRITE_BUFFER);
    let mut written = 0u64;
    loop {
        let frame = match next_frame(&mut response, flags, None).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(stop) => {
                file.write_all(&buffer)?;
                return Err(stop);
            }
        };

        buffer.extend_from_slice(&frame);
        written += frame.len() as u64;
        if buffer.len() >= STREAM_WRITE_BUFFER {
            file.write_all(&buffer)?;
            buffer.clear();
        }
    }
    file.write_all(&buffer)?;

    let final_size = resume_from + written;
    if expected_total > 0 && final_size != expected_total {
        return Err(DownloadError::SizeMismatch {
            expected: expected_total,
            actual: final_size,
        });
    }
    Ok(final_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_range_header() {
        assert_eq!(chunk_range_header(0, 99_999_999), "bytes=0-99999999");
        assert_eq!(chunk_range_header(100, 199), "bytes=100-199");
    }

    #[test]
    fn test_open_range_header_for_resume() {
        // 单流续传：文件已有 40,000,000 字节时从该偏移续传
        assert_eq!(open_range_header(40_000_000), "bytes=40000000-");
        assert_eq!(open_range_header(0), "bytes=0-");
    }

    #[test]
    fn test_flags_priority() {
        let flags = TransferFlags::new();
        let chunk_abort = AtomicBool::new(false);
        assert!(flags.check(Some(&chunk_abort)).is_ok());

        chunk_abort.store(true, Ordering::Release);
        assert!(matches!(
            flags.check(Some(&chunk_abort)),
            Err(DownloadError::Cancelled)
        ));

        // 任务级取消优先于暂停
        let flags = TransferFlags::new();
        flags.paused.store(true, Ordering::Release);
        assert!(matches!(flags.check(None), Err(DownloadError::Paused)));
        flags.cancelled.store(true, Ordering::Release);
        assert!(matches!(flags.check(None), Err(DownloadError::Cancelled)));
    }
}
