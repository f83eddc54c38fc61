//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar per batch run, cleared on completion.
//! Non-TTY mode: hidden bars; the end-of-run summary is logged instead.

use std::io::IsTerminal;
use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Item-count bar: `scrape  [=====>    ] 120/400 00:12 ...`
fn batch_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:<10.cyan.bold} [{bar:30.green/dim}] {pos}/{len} {elapsed_precise} {wide_msg:.dim}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

/// Bar label, cut to the first 10 characters.
fn bar_prefix(name: &str) -> String {
    name.chars().take(10).collect()
}

/// Shared progress display.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY on stderr.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    pub fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Bar counting settled items of one batch run.
    ///
    /// Hidden outside a TTY; the processor still advances it.
    pub fn batch_bar(&self, name: &str, total: usize) -> ProgressBar {
        if !self.is_tty {
            let pb = ProgressBar::hidden();
            pb.set_length(total as u64);
            return pb;
        }
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(batch_style());
        pb.set_prefix(bar_prefix(name));
        pb
    }

    /// Print a line above managed progress bars.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// `MultiProgress` for the log bridge
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(123), "123");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(123_456), "123,456");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }

    #[test]
    fn bar_prefix_cuts_on_characters() {
        assert_eq!(bar_prefix("scrape"), "scrape");
        assert_eq!(bar_prefix("check-links-now"), "check-link");
        assert_eq!(bar_prefix("crème brûlée"), "crème brûl");
        assert_eq!(bar_prefix("🍦🍦🍦🍦🍦🍦🍦🍦🍦🍦🍦"), "🍦🍦🍦🍦🍦🍦🍦🍦🍦🍦");
    }

    #[test]
    fn tty_bar_accepts_non_ascii_names() {
        let ctx = ProgressContext::with_tty(true);
        let pb = ctx.batch_bar("glacé-sorbet-shops", 3);
        assert_eq!(pb.prefix(), "glacé-sorb");
        assert_eq!(pb.length(), Some(3));
    }

    #[test]
    fn non_tty_bar_is_hidden_but_counts() {
        let ctx = ProgressContext::with_tty(false);
        let pb = ctx.batch_bar("scrape", 5);
        assert!(pb.is_hidden());
        assert_eq!(pb.length(), Some(5));
        pb.inc(2);
        assert_eq!(pb.position(), 2);
    }
}
