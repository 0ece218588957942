//! Lazy-RTGC: a fixed page-copy budget per invocation bounds worst-case
//! per-I/O GC work for predictable latency.
//! Lazy-RTGC：每次调用固定的页复制预算，约束单次 I/O 的最坏 GC 开销，
//! 换取可预测的延迟。

use log::debug;

use crate::conf::FtlConf;
use crate::metrics::Metrics;
use crate::policy::{GcPolicy, PolicyStats, Trigger};

const RING: usize = 1000;
const COLUMNS: &str = "<timestamp> <gc_invocations> <page_copies> <valid_copies> <erases> \
<avg_response_time> <p99_latency> <p99.9_latency> <p99.99_latency>";

pub struct LazyRtgc {
  threshold: u32,
  max_page_copies: u32,
  metrics: Metrics,
  stats: PolicyStats,
  last_now: u64,
}

impl LazyRtgc {
  #[must_use]
  pub fn new(conf: &FtlConf) -> Self {
    let mut metrics = Metrics::new(RING);
    if conf.lazy.metrics_enable {
      if let Some(dir) = &conf.metrics_dir {
        metrics.enable_file(&dir.join("lazy_rtgc"), "Lazy-RTGC", COLUMNS);
      }
    }

    Self {
      threshold: conf.lazy.threshold,
      max_page_copies: conf.lazy.max_page_copies,
      metrics,
      stats: PolicyStats::default(),
      last_now: 0,
    }
  }

  fn emit_row(&self) {
    self.metrics.append_row(&[
      self.last_now.to_string(),
      self.stats.gc_invocations.to_string(),
      self.stats.total_page_copies.to_string(),
      self.stats.valid_page_copies.to_string(),
      self.stats.erases.to_string(),
      format!("{:.2}", self.metrics.avg_response()),
      self.metrics.latency_percentile(0.99).to_string(),
      self.metrics.latency_percentile(0.999).to_string(),
      self.metrics.latency_percentile(0.9999).to_string(),
    ]);
  }
}

impl GcPolicy for LazyRtgc {
  fn name(&self) -> &'static str {
    "lazy-rtgc"
  }

  fn should_trigger(&mut self, free_blocks: u32, _now: u64) -> Option<Trigger> {
    if free_blocks <= self.threshold {
      debug!("lazy-rtgc: trigger, {} free blocks <= {}", free_blocks, self.threshold);
      Some(Trigger::Normal)
    } else {
      None
    }
  }

  /// The budget is fixed regardless of state.
  /// 预算固定，与状态无关。
  fn action(&mut self, _free_blocks: u32, _trigger: Trigger) -> u32 {
    self.max_page_copies
  }

  fn on_response(&mut self, response_ns: u64, now: u64) {
    self.last_now = now;
    if self.metrics.record(response_ns) {
      self.emit_row();
    }
    self.stats.avg_response_ns = self.metrics.avg_response();
  }

  fn record_gc_invocation(&mut self, copied_pages: u32, valid_copies: u32) {
    self.stats.gc_invocations += 1;
    self.stats.total_page_copies += copied_pages as u64;
    self.stats.valid_page_copies += valid_copies as u64;
  }

  fn record_block_erase(&mut self) {
    self.stats.erases += 1;
  }

  fn stats(&self) -> PolicyStats {
    self.stats
  }

  fn finalize(&mut self) {
    self.emit_row();

    let s = &self.stats;
    let avg_per_gc = if s.gc_invocations > 0 {
      s.total_page_copies as f64 / s.gc_invocations as f64
    } else {
      0.0
    };

    self.metrics.write_summary(&format!(
      "Lazy-RTGC Policy Summary Report\n\
       ===============================\n\n\
       Simulation Parameters:\n\
       ---------------------\n\
       GC Threshold: {} free blocks\n\
       Max Page Copies per GC: {} pages\n\n\
       GC Statistics:\n\
       -------------\n\
       Total GC Invocations: {}\n\
       Total Pages Copied: {}\n\
       Valid Pages Copied: {}\n\
       Block Erasures: {}\n\n\
       Performance Metrics:\n\
       -------------------\n\
       Average Response Time: {:.2} ns\n\
       P99 Latency: {} ns\n\
       P99.9 Latency: {} ns\n\
       P99.99 Latency: {} ns\n\n\
       Efficiency Metrics:\n\
       ------------------\n\
       Average Pages Copied per GC: {:.2}\n",
      self.threshold,
      self.max_page_copies,
      s.gc_invocations,
      s.total_page_copies,
      s.valid_page_copies,
      s.erases,
      self.metrics.avg_response(),
      self.metrics.latency_percentile(0.99),
      self.metrics.latency_percentile(0.999),
      self.metrics.latency_percentile(0.9999),
      avg_per_gc,
    ));
  }
}
