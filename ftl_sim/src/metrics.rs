//! Response-time ring, percentile calculator and metrics file emitter.
//! 响应时间环、分位数计算器与指标文件输出。
//!
//! One collector exists per GC policy. File handles follow
//! "open, append one line, close" so long simulations never hold a
//! descriptor; append failures are logged and swallowed.
//! 每个 GC 策略一个收集器。文件句柄遵循“打开、追加一行、关闭”，
//! 长时间模拟不持有描述符；追加失败记录日志后忽略。

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::warn;

/// Rows are appended every this many recorded responses.
/// 每记录这么多次响应追加一行。
pub const EMIT_EVERY: u64 = 1000;

/// Percentiles are meaningless below this sample count and return 0.
/// 样本数低于该值时分位数无意义，返回 0。
pub const MIN_SAMPLES: usize = 100;

/// Bounded ring of recent response times plus the periodic file emitter.
/// 近期响应时间的有界环，外加周期性文件输出。
pub struct Metrics {
  ring: VecDeque<u64>,
  cap: usize,
  record_count: u64,
  avg_response: f64,

  enabled: bool,
  path: Option<PathBuf>,
}

impl Metrics {
  /// `name` becomes the `# <name> Metrics` file header.
  /// `name` 会成为 `# <name> Metrics` 文件头。
  #[must_use]
  pub fn new(cap: usize) -> Self {
    Self {
      ring: VecDeque::with_capacity(cap),
      cap,
      record_count: 0,
      avg_response: 0.0,
      enabled: false,
      path: None,
    }
  }

  /// Enable file output. Truncates `<base>_metrics.txt` and writes the
  /// header; `columns` documents the row format.
  /// 启用文件输出。截断 `<base>_metrics.txt` 并写入文件头；`columns`
  /// 描述行格式。
  pub fn enable_file(&mut self, base: &Path, name: &str, columns: &str) {
    let path = PathBuf::from(format!("{}_metrics.txt", base.display()));
    let header = format!("# {} Metrics\n# Format: {}\n", name, columns);

    match std::fs::write(&path, header) {
      Ok(()) => {
        self.enabled = true;
        self.path = Some(path);
      }
      Err(e) => warn!("metrics: failed to initialize {:?}: {}", path, e),
    }
  }

  /// Record one response time. Values above `i64::MAX` are unreasonable for
  /// the modeled device and are dropped. Returns `true` when a periodic row
  /// is due.
  /// 记录一次响应时间。超过 `i64::MAX` 的值对被建模设备不合理，直接
  /// 丢弃。当需要输出周期行时返回 `true`。
  pub fn record(&mut self, response_ns: u64) -> bool {
    if response_ns > i64::MAX as u64 {
      return false;
    }

    if self.ring.len() == self.cap {
      self.ring.pop_front();
    }
    self.ring.push_back(response_ns);
    self.record_count += 1;

    self.avg_response = self.ring.iter().map(|&t| t as f64).sum::<f64>() / self.ring.len() as f64;
    if self.avg_response > 1e16 {
      // Overflow guard: recompute from the first 100 entries only.
      // 溢出保护：仅用前 100 个条目重新计算。
      let n = self.ring.len().min(100);
      self.avg_response = self.ring.iter().take(n).map(|&t| t as f64).sum::<f64>() / n as f64;
    }

    self.enabled && self.record_count % EMIT_EVERY == 0
  }

  #[inline]
  #[must_use]
  pub fn avg_response(&self) -> f64 {
    self.avg_response
  }

  #[inline]
  #[must_use]
  pub fn samples(&self) -> usize {
    self.ring.len()
  }

  #[inline]
  #[must_use]
  pub fn record_count(&self) -> u64 {
    self.record_count
  }

  /// Interpolated latency percentile, `p` in (0, 1). Returns 0 below
  /// [`MIN_SAMPLES`] samples.
  /// 线性插值的延迟分位数，`p` ∈ (0, 1)。样本数不足 [`MIN_SAMPLES`]
  /// 时返回 0。
  #[must_use]
  pub fn latency_percentile(&self, p: f64) -> u64 {
    if self.ring.len() < MIN_SAMPLES {
      return 0;
    }

    let mut sorted: Vec<u64> = self.ring.iter().copied().collect();
    sorted.sort_unstable();

    let position = (sorted.len() - 1) as f64 * p;
    let idx = position as usize;
    if idx >= sorted.len() - 1 {
      return sorted[sorted.len() - 1];
    }

    let fraction = position - idx as f64;
    if fraction > 0.0 {
      (sorted[idx] as f64 * (1.0 - fraction) + sorted[idx + 1] as f64 * fraction) as u64
    } else {
      sorted[idx]
    }
  }

  /// The three RL reward thresholds (70th/90th/99th index-based
  /// percentiles) from one sort of the ring. `None` below [`MIN_SAMPLES`].
  /// 一次排序得到三个 RL 奖励阈值（70/90/99 按索引分位数）。样本不足
  /// 时返回 `None`。
  #[must_use]
  pub fn reward_thresholds(&self) -> Option<(u64, u64, u64)> {
    if self.ring.len() < MIN_SAMPLES {
      return None;
    }

    let mut sorted: Vec<u64> = self.ring.iter().copied().collect();
    sorted.sort_unstable();

    let n = sorted.len();
    let at = |pct: usize| sorted[(n * pct / 100).min(n - 1)];
    Some((at(70), at(90), at(99)))
  }

  /// Index-based percentile used for the RL reward thresholds
  /// (`sorted[len * pct / 100]`). Returns 0 below [`MIN_SAMPLES`].
  /// RL 奖励阈值使用的按索引分位数。样本不足时返回 0。
  #[must_use]
  pub fn threshold_percentile(&self, pct: usize) -> u64 {
    if self.ring.len() < MIN_SAMPLES {
      return 0;
    }

    let mut sorted: Vec<u64> = self.ring.iter().copied().collect();
    sorted.sort_unstable();
    sorted[(sorted.len() * pct / 100).min(sorted.len() - 1)]
  }

  /// Append one space-separated row; open-append-close, errors swallowed.
  /// 追加一行空格分隔数据；开-追加-关，错误被吞掉。
  pub fn append_row(&self, columns: &[String]) {
    let Some(path) = self.path.as_ref().filter(|_| self.enabled) else {
      return;
    };

    let line = columns.join(" ");
    let result = OpenOptions::new()
      .append(true)
      .create(true)
      .open(path)
      .and_then(|mut f| writeln!(f, "{}", line));

    if let Err(e) = result {
      warn!("metrics: append to {:?} failed: {}", path, e);
    }
  }

  /// Write the final `<base>_summary.txt`, replacing any previous one.
  /// 写出最终的 `<base>_summary.txt`，覆盖旧文件。
  pub fn write_summary(&self, text: &str) {
    let Some(path) = self.path.as_ref().filter(|_| self.enabled) else {
      return;
    };

    let summary = path
      .to_string_lossy()
      .replace("_metrics.txt", "_summary.txt");
    if let Err(e) = std::fs::write(&summary, text) {
      warn!("metrics: summary write to {} failed: {}", summary, e);
    }
  }

  #[inline]
  #[must_use]
  pub fn file_enabled(&self) -> bool {
    self.enabled
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn percentile_returns_zero_below_min_samples() {
    let mut m = Metrics::new(1000);
    for i in 0..(MIN_SAMPLES - 1) {
      m.record(i as u64);
    }
    assert_eq!(m.latency_percentile(0.99), 0);
    assert_eq!(m.threshold_percentile(70), 0);
  }

  #[test]
  fn percentile_interpolates_on_uniform_data() {
    let mut m = Metrics::new(1000);
    for i in 0..=100u64 {
      m.record(i * 10);
    }

    // 101 samples 0..=1000: the median sits exactly on index 50.
    assert_eq!(m.latency_percentile(0.5), 500);
    let p99 = m.latency_percentile(0.99);
    assert!(p99 >= 980 && p99 <= 1000);
  }

  #[test]
  fn ring_is_bounded_and_average_tracks_it() {
    let mut m = Metrics::new(10);
    for _ in 0..10 {
      m.record(100);
    }
    for _ in 0..10 {
      m.record(200);
    }

    assert_eq!(m.samples(), 10);
    assert!((m.avg_response() - 200.0).abs() < f64::EPSILON);
    assert_eq!(m.record_count(), 20);
  }

  #[test]
  fn unreasonable_measurements_are_dropped() {
    let mut m = Metrics::new(10);
    m.record(u64::MAX);
    m.record((i64::MAX as u64) + 1);
    assert_eq!(m.samples(), 0);

    m.record(5);
    assert_eq!(m.samples(), 1);
  }

  #[test]
  fn rows_append_to_file() {
    let dir = std::env::temp_dir().join("ftl_sim_metrics_test");
    std::fs::create_dir_all(&dir).unwrap();
    let base = dir.join("unit");

    let mut m = Metrics::new(10);
    m.enable_file(&base, "Unit", "<a> <b>");
    m.append_row(&["1".into(), "2".into()]);
    m.write_summary("Summary\n");

    let text = std::fs::read_to_string(dir.join("unit_metrics.txt")).unwrap();
    assert!(text.starts_with("# Unit Metrics"));
    assert!(text.ends_with("1 2\n"));
    let summary = std::fs::read_to_string(dir.join("unit_summary.txt")).unwrap();
    assert_eq!(summary, "Summary\n");

    std::fs::remove_dir_all(&dir).ok();
  }
}
