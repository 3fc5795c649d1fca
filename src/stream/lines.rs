//! 字节流按行切分
//!
//! 块边界可以落在任意位置（包括 UTF-8 多字节字符中间），
//! 未结束的行保存在缓冲区里，直到遇到换行或 [`LineSplitter::finish`]。
//! 超过长度上限的行整行丢弃。

/// 默认单行上限（字节）
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// 带跨块缓冲的行切分器
#[derive(Debug)]
pub struct LineSplitter {
    buffer: Vec<u8>,
    /// `buffer[..scanned]` 已确认不含换行
    scanned: usize,
    max_line_bytes: usize,
    /// 当前行已超长，丢弃到下一个换行为止
    discarding: bool,
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line_bytes,
            discarding: false,
        }
    }

    /// 输入一个字节块，返回其中所有完整的非空行
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            if self.discarding {
                self.discarding = false;
            } else if end - start > self.max_line_bytes {
                self.warn_oversized(end - start);
            } else if let Some(line) = decode_line(&self.buffer[start..end]) {
                lines.push(line);
            }
            start = end + 1;
            search_from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line_bytes {
            if !self.discarding {
                self.warn_oversized(self.buffer.len());
            }
            self.discarding = true;
            self.buffer.clear();
            self.scanned = 0;
        }
        lines
    }

    /// 输出末尾未以换行结束的行
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        decode_line(&rest)
    }

    /// 缓冲中尚未成行的字节数
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn warn_oversized(&self, len: usize) {
        tracing::warn!(
            "[LINES] 丢弃超长行: {} 字节以上，上限 {}",
            len,
            self.max_line_bytes
        );
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_carry_over_across_chunks() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"{\"type\":\"te").is_empty());
        assert_eq!(splitter.pending(), 11);
        assert_eq!(
            splitter.push(b"xt\"}\n\n{\"a\":1}\r\n{\"b\""),
            vec!["{\"type\":\"text\"}".to_string(), "{\"a\":1}".to_string()]
        );
        assert_eq!(splitter.finish(), Some("{\"b\"".to_string()));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_multibyte_split() {
        let text = "{\"content\":\"héllo 世界\"}\n";
        let bytes = text.as_bytes();
        let mut splitter = LineSplitter::new();
        let mut lines = Vec::new();
        for byte in bytes {
            lines.extend(splitter.push(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec![text.trim_end().to_string()]);
    }

    #[test]
    fn test_oversized_line_is_dropped() {
        let mut splitter = LineSplitter::with_max_line_bytes(16);
        assert!(splitter.push(b"0123456789").is_empty());
        assert!(splitter.push(b"0123456789").is_empty());
        assert_eq!(splitter.pending(), 0);
        assert_eq!(
            splitter.push(b"tail\n{\"a\":1}\n"),
            vec!["{\"a\":1}".to_string()]
        );

        assert_eq!(
            splitter.push(b"01234567890123456789\nok\n"),
            vec!["ok".to_string()]
        );
        assert!(splitter.push(b"01234567890123456789").is_empty());
        assert_eq!(splitter.finish(), None);
        assert_eq!(splitter.push(b"next\n"), vec!["next".to_string()]);
    }

    #[test]
    fn test_long_line_in_many_chunks() {
        let mut splitter = LineSplitter::new();
        let chunk = [b'x'; 1024];
        for _ in 0..512 {
            assert!(splitter.push(&chunk).is_empty());
        }
        assert_eq!(splitter.pending(), 512 * 1024);
        let lines = splitter.push(b"\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 512 * 1024);
    }

    proptest! {
        /// 任意切块方式得到的行与一次性输入相同
        #[test]
        fn prop_fragmentation_invariance(
            lines in prop::collection::vec("[a-zA-Z0-9 {}:\",é世]{0,20}", 0..10),
            cuts in prop::collection::vec(0usize..400, 0..12)
        ) {
            let input = lines.join("\n");
            let bytes = input.as_bytes();

            let mut whole = LineSplitter::new();
            let mut expected = whole.push(bytes);
            expected.extend(whole.finish());

            let mut points: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
            points.sort_unstable();
            points.dedup();

            let mut splitter = LineSplitter::new();
            let mut actual = Vec::new();
            let mut last = 0;
            for point in points {
                actual.extend(splitter.push(&bytes[last..point]));
                last = point;
            }
            actual.extend(splitter.push(&bytes[last..]));
            actual.extend(splitter.finish());

            prop_assert_eq!(actual, expected);
        }
    }
}
