//! 上下文跟踪 - 流程层
//!
//! 维护一段有界的滚动摘要：每组结束后，取最近一次成功条目文本的尾部，
//! 与上一窗口的尾部合并成新窗口，整体封顶。下一组的请求以它作前言。
//!
//! 规则：
//! - 首组永远以空窗口运行
//! - 失败条目不推进窗口
//! - 窗口只由本跟踪器修改，派发服务只读

use crate::config::Config;

/// 上下文跟踪器
///
/// 各文档任务各持一份，互不共享
#[derive(Debug)]
pub struct ContextTracker {
    window: String,
    carry_chars: usize,
    take_chars: usize,
    max_chars: usize,
}

impl ContextTracker {
    pub fn new(config: &Config) -> Self {
        Self {
            window: String::new(),
            carry_chars: config.context_carry_chars,
            take_chars: config.context_take_chars,
            max_chars: config.context_max_chars,
        }
    }

    /// 当前窗口（空串表示尚无上下文）
    pub fn window(&self) -> &str {
        &self.window
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// 用一组里最近一次成功条目的文本推进窗口
    pub fn update(&mut self, last_success_text: &str) {
        let fresh = last_success_text.trim();
        if fresh.is_empty() {
            return;
        }

        let carried = tail_chars(&self.window, self.carry_chars);
        let taken = tail_chars(fresh, self.take_chars);

        let merged = if carried.is_empty() {
            taken.to_string()
        } else {
            format!("{}\n{}", carried, taken)
        };

        self.window = tail_chars(&merged, self.max_chars).to_string();
    }
}

/// 取字符串最后 n 个字符（按字符数，不按字节）
fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let skip = count - n;
    match s.char_indices().nth(skip) {
        Some((byte_index, _)) => &s[byte_index..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(carry: usize, take: usize, max: usize) -> ContextTracker {
        ContextTracker {
            window: String::new(),
            carry_chars: carry,
            take_chars: take,
            max_chars: max,
        }
    }

    #[test]
    fn test_first_group_runs_with_empty_window() {
        let t = ContextTracker::new(&Config::default());
        assert!(t.is_empty());
        assert_eq!(t.window(), "");
    }

    #[test]
    fn test_update_takes_tail_of_new_text() {
        let mut t = tracker(10, 4, 100);
        t.update("一二三四五六七八");
        assert_eq!(t.window(), "五六七八");
    }

    #[test]
    fn test_update_merges_previous_tail() {
        let mut t = tracker(3, 4, 100);
        t.update("甲乙丙丁");
        t.update("1234");
        // 上一窗口尾部 3 字 + 新文本尾部 4 字
        assert_eq!(t.window(), "乙丙丁\n1234");
    }

    #[test]
    fn test_window_never_exceeds_cap() {
        let mut t = tracker(200, 300, 50);
        for i in 0..100 {
            t.update(&format!("第{}段识别结果，", i).repeat(30));
            assert!(t.window().chars().count() <= 50, "窗口超限");
        }
    }

    #[test]
    fn test_blank_text_does_not_advance_window() {
        let mut t = tracker(10, 10, 100);
        t.update("有效内容");
        let before = t.window().to_string();
        t.update("   ");
        t.update("");
        assert_eq!(t.window(), before);
    }

    #[test]
    fn test_tail_chars_respects_char_boundaries() {
        assert_eq!(tail_chars("你好世界", 2), "世界");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("", 3), "");
    }
}
