use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use crate::core::error::DownloadError;

/// 把目标文件预分配到已知大小。
/// 之后各分块只在自己的区间内做定位写，彼此无需加锁，也不会有截断竞争。
pub fn preallocate(path: &Path, len: u64) -> Result<(), DownloadError> {
    let file = OpenOptions::new().create(true).write(true).open(path)?;
    file.set_len(len)?;
    Ok(())
}

/// 定位缓冲写入器：在共享目标文件的固定偏移处顺序写入。
/// 打开时 seek 到分块起点，绝不 truncate，已落盘的其它分块数据不受影响。
pub struct PositionedWriter {
    file: File,
    buffer: Vec<u8>,
    buffer_size: usize,
    flushed: u64,
}

impl PositionedWriter {
    pub fn open(path: &Path, offset: u64, buffer_size: usize) -> Result<Self, DownloadError> {
        let mut file = OpenOptions::new().create(true).write(true).open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            file,
            buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            flushed: 0,
        })
    }

    /// 写入一段数据；缓冲满时刷盘
    pub fn write(&mut self, data: &[u8]) -> Result<(), DownloadError> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// 把缓冲内容刷入文件。
    /// 暂停和中止路径都必须先 flush，`downloaded` 计数才与磁盘一致。
    pub fn flush(&mut self) -> Result<(), DownloadError> {
        if !self.buffer.is_empty() {
            self.file.write_all(&self.buffer)?;
            self.flushed += self.buffer.len() as u64;
            self.buffer.clear();
        }
        Ok(())
    }

    /// 已刷入磁盘的字节数（不含缓冲中未落盘的部分）
    pub fn bytes_flushed(&self) -> u64 {
        self.flushed
    }

    /// 缓冲中尚未刷盘的字节数
    pub fn bytes_buffered(&self) -> u64 {
        self.buffer.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("创建临时目录失败")
    }

    #[test]
    fn test_preallocate_sets_length() {
        let dir = temp_dir();
        let path = dir.path().join("pre.bin");
        preallocate(&path, 4096).expect("预分配失败");
        assert_eq!(std::fs::metadata(&path).expect("读取元数据失败").len(), 4096);
    }

    #[test]
    fn test_positioned_write_lands_at_offset() {
        let dir = temp_dir();
        let path = dir.path().join("out.bin");
        preallocate(&path, 16).expect("预分配失败");

        let mut writer = PositionedWriter::open(&path, 4, 8).expect("打开写入器失败");
        writer.write(b"abcd").expect("写入失败");
        writer.flush().expect("刷盘失败");
        assert_eq!(writer.bytes_flushed(), 4);

        let mut content = Vec::new();
        File::open(&path).expect("打开文件失败").read_to_end(&mut content).expect("读取失败");
        assert_eq!(content.len(), 16);
        assert_eq!(&content[4..8], b"abcd");
        // 区间外的字节保持原样
        assert_eq!(&content[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_write_never_truncates() {
        let dir = temp_dir();
        let path = dir.path().join("keep.bin");
        preallocate(&path, 1024).expect("预分配失败");

        let mut writer = PositionedWriter::open(&path, 0, 64).expect("打开写入器失败");
        writer.write(b"xy").expect("写入失败");
        writer.flush().expect("刷盘失败");
        assert_eq!(std::fs::metadata(&path).expect("读取元数据失败").len(), 1024);
    }

    #[test]
    fn test_buffered_bytes_counted_separately() {
        let dir = temp_dir();
        let path = dir.path().join("buf.bin");
        preallocate(&path, 64).expect("预分配失败");

        let mut writer = PositionedWriter::open(&path, 0, 1024).expect("打开写入器失败");
        writer.write(b"hello").expect("写入失败");
        assert_eq!(writer.bytes_flushed(), 0);
        assert_eq!(writer.bytes_buffered(), 5);
        writer.flush().expect("刷盘失败");
        assert_eq!(writer.bytes_flushed(), 5);
        assert_eq!(writer.bytes_buffered(), 0);
    }
}
