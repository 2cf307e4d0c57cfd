use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// 单个分块的字节区间与进度。
/// `downloaded` 由抓取协程累加、采样器读取；`cancelled` 独立于任务级
/// 取消标志，用于暂停和策略回退时立刻掐断本块的网络流。
#[derive(Debug, Clone)]
pub struct ChunkProgress {
    pub start: u64,
    /// 闭区间上界
    pub end: u64,
    pub downloaded: Arc<AtomicU64>,
    pub cancelled: Arc<AtomicBool>,
}

impl ChunkProgress {
    fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            downloaded: Arc::new(AtomicU64::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_downloaded() >= self.len()
    }

    /// 断点续传时的起始偏移：已落盘区间之后的第一个字节
    pub fn resume_offset(&self) -> u64 {
        self.start + self.bytes_downloaded()
    }
}

/// 把 `[0, total)` 切成 n 段近似等长的连续闭区间，余数并入最后一段
pub fn split_ranges(total: u64, n: usize) -> Vec<(u64, u64)> {
    assert!(total > 0 && n > 0);
    let n = (n as u64).min(total);
    let chunk_len = total / n;
    let mut ranges = Vec::with_capacity(n as usize);
    for i in 0..n {
        let start = i * chunk_len;
        let end = if i == n - 1 { total - 1 } else { (i + 1) * chunk_len - 1 };
        ranges.push((start, end));
    }
    ranges
}

/// 一个任务的全部分块。
/// 不变量：各块互不重叠、首尾相接，并集恰好覆盖 `[0, total)`。
#[derive(Debug)]
pub struct ChunkSet {
    chunks: Vec<ChunkProgress>,
    total: u64,
}

impl ChunkSet {
    pub fn plan(total: u64, threads: usize) -> Self {
        let chunks = split_ranges(total, threads)
            .into_iter()
            .map(|(start, end)| ChunkProgress::new(start, end))
            .collect();
        Self { chunks, total }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    pub fn chunks(&self) -> &[ChunkProgress] {
        &self.chunks
    }

    /// 所有分块已落盘字节之和；完成时恰好等于 total
    pub fn total_downloaded(&self) -> u64 {
        self.chunks.iter().map(|c| c.bytes_downloaded()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.is_complete())
    }

    /// 尚未完成的分块，返回 (索引, 续传偏移, 区间上界)。
    /// 恢复下载只重新抓取这些真正缺失的子区间，而不是按文件大小瞎猜。
    pub fn remaining(&self) -> Vec<(usize, u64, u64)> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_complete())
            .map(|(i, c)| (i, c.resume_offset(), c.end))
            .collect()
    }

    /// 通知所有在途分块中止（暂停、取消或策略回退）
    pub fn abort_all(&self) {
        for chunk in &self.chunks {
            chunk.cancelled.store(true, Ordering::Release);
        }
    }

    /// 恢复前清掉中止标志，否则新协程一启动就会自杀
    pub fn clear_aborts(&self) {
        for chunk in &self.chunks {
            chunk.cancelled.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_eight_equal_chunks() {
        // 800MB 按 8 线程切：每块恰好 1 亿字节
        let ranges = split_ranges(800_000_000, 8);
        assert_eq!(ranges.len(), 8);
        for (i, (start, end)) in ranges.iter().enumerate() {
            assert_eq!(*start, i as u64 * 100_000_000);
            assert_eq!(end - start + 1, 100_000_000);
        }
        assert_eq!(ranges[7].1, 799_999_999);
    }

    #[test]
    fn test_split_last_chunk_absorbs_remainder() {
        let ranges = split_ranges(100, 3);
        assert_eq!(ranges, vec![(0, 32), (33, 65), (66, 99)]);
        // 余数全部进最后一块
        assert_eq!(ranges[2].1 - ranges[2].0 + 1, 34);
    }

    #[test]
    fn test_split_is_disjoint_and_contiguous() {
        for (total, n) in [(1_000u64, 7usize), (8_192, 8), (999, 4), (5, 2)] {
            let ranges = split_ranges(total, n);
            assert_eq!(ranges[0].0, 0);
            assert_eq!(ranges.last().unwrap().1, total - 1);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].1 + 1, pair[1].0);
            }
            let covered: u64 = ranges.iter().map(|(s, e)| e - s + 1).sum();
            assert_eq!(covered, total);
        }
    }

    #[test]
    fn test_split_more_threads_than_bytes() {
        // 线程数压到字节数，保证不出现空区间
        let ranges = split_ranges(3, 8);
        assert_eq!(ranges, vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_chunk_set_progress_accounting() {
        let set = ChunkSet::plan(100, 4);
        assert_eq!(set.total_downloaded(), 0);
        assert!(!set.is_complete());

        for chunk in set.chunks() {
            chunk.downloaded.store(chunk.len(), Ordering::Release);
        }
        assert!(set.is_complete());
        assert_eq!(set.total_downloaded(), 100);
        assert!(set.remaining().is_empty());
    }

    #[test]
    fn test_remaining_tracks_partial_chunks() {
        let set = ChunkSet::plan(100, 4);
        // 第 0 块完成，第 1 块下到一半，其余未动
        set.chunks()[0].downloaded.store(set.chunks()[0].len(), Ordering::Release);
        set.chunks()[1].downloaded.store(10, Ordering::Release);

        let remaining = set.remaining();
        assert_eq!(remaining.len(), 3);
        let (idx, resume_from, end) = remaining[0];
        assert_eq!(idx, 1);
        assert_eq!(resume_from, set.chunks()[1].start + 10);
        assert_eq!(end, set.chunks()[1].end);
    }

    #[test]
    fn test_abort_flags_roundtrip() {
        let set = ChunkSet::plan(100, 2);
        set.abort_all();
        assert!(set.chunks().iter().all(|c| c.cancelled.load(Ordering::Acquire)));
        set.clear_aborts();
        assert!(set.chunks().iter().all(|c| !c.cancelled.load(Ordering::Acquire)));
    }
}
