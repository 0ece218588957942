//! Aggressive RL GC: early collection below a third threshold (TAGC) and
//! read-triggered collection during idle periods.
//! 激进 RL GC：在第三阈值 (TAGC) 之下提前回收，并在空闲期由读操作
//! 触发回收。

use std::path::PathBuf;

use ftl_rl::state::curr_interval_bin;
use log::debug;

use crate::conf::FtlConf;
use crate::metrics::Metrics;
use crate::policy::rl::RlCore;
use crate::policy::{GcPolicy, PolicyStats, Trigger};

const RING: usize = 1000;
const COLUMNS: &str = "<timestamp> <gc_invocations> <page_copies> <intensive_gc_count> \
<read_triggered_count> <early_gc_count> <erases> <avg_reward> <avg_response_time> \
<p99_latency> <p99.9_latency> <p99.99_latency>";

/// Read-side trigger fires while free blocks sit at or below 1.5 × TGC.
/// 当空闲块不超过 1.5 × TGC 时读侧触发生效。
const READ_TRIGGER_FACTOR: f64 = 1.5;

/// The current-interval bin must exceed this for "sufficient idle".
/// 当前间隔桶必须超过该值才算“足够空闲”。
const READ_IDLE_BIN: u8 = 2;

pub struct RlAggressiveGc {
  core: RlCore,
  metrics: Metrics,
  stats: PolicyStats,

  tagc: u32,
  max_gc_ops: u32,
  read_triggered_enabled: bool,
  in_intensive: bool,

  last_now: u64,
  metrics_dir: Option<PathBuf>,
}

impl RlAggressiveGc {
  #[must_use]
  pub fn new(conf: &FtlConf) -> Self {
    let mut metrics = Metrics::new(RING);
    if conf.aggressive.metrics_enable {
      if let Some(dir) = &conf.metrics_dir {
        metrics.enable_file(&dir.join("rl_aggressive"), "RL-Aggressive", COLUMNS);
      }
    }

    let mut rl = conf.rl.clone();
    rl.debug_enable = rl.debug_enable || conf.aggressive.debug_enable;

    Self {
      core: RlCore::new(&rl, conf.seed.wrapping_add(1), conf.metrics_dir.as_deref()),
      metrics,
      stats: PolicyStats::default(),
      tagc: conf.aggressive.tagc_threshold,
      max_gc_ops: conf.aggressive.max_gc_ops,
      read_triggered_enabled: conf.aggressive.read_triggered_gc,
      in_intensive: false,
      last_now: 0,
      metrics_dir: conf.metrics_dir.clone(),
    }
  }

  #[inline]
  #[must_use]
  pub fn in_intensive_mode(&self) -> bool {
    self.in_intensive
  }

  fn emit_row(&self, now: u64) {
    self.metrics.append_row(&[
      now.to_string(),
      self.stats.gc_invocations.to_string(),
      self.stats.total_page_copies.to_string(),
      self.stats.intensive_gc.to_string(),
      self.stats.read_triggered_gc.to_string(),
      self.stats.early_gc.to_string(),
      self.stats.erases.to_string(),
      format!("{:.4}", self.stats.avg_reward),
      format!("{:.2}", self.metrics.avg_response()),
      self.metrics.latency_percentile(0.99).to_string(),
      self.metrics.latency_percentile(0.999).to_string(),
      self.metrics.latency_percentile(0.9999).to_string(),
    ]);
  }
}

impl GcPolicy for RlAggressiveGc {
  fn name(&self) -> &'static str {
    "rl-aggressive"
  }

  fn should_trigger(&mut self, free_blocks: u32, now: u64) -> Option<Trigger> {
    self.core.observe(now);

    // Intensive override beats the idle-time requirement.
    // 强化覆盖优先于空闲时间要求。
    if free_blocks <= self.core.tigc {
      if !self.in_intensive {
        debug!("rl-aggressive: entering intensive mode at {} free blocks", free_blocks);
        self.in_intensive = true;
      }
      return Some(Trigger::Intensive);
    }

    // Hysteresis: stay intensive until comfortably above TIGC.
    // 迟滞：直到明显高于 TIGC 才退出强化模式。
    if self.in_intensive && free_blocks > self.core.tigc + 2 {
      debug!("rl-aggressive: exiting intensive mode at {} free blocks", free_blocks);
      self.in_intensive = false;
    }

    if self.core.curr_interval == 0 {
      return None;
    }

    if self.in_intensive {
      return Some(Trigger::Intensive);
    }

    if free_blocks <= self.core.tgc {
      self.core.update_state();
      return Some(Trigger::Normal);
    }

    if free_blocks <= self.tagc {
      self.stats.early_gc += 1;
      debug!(
        "rl-aggressive: early trigger, {} free in ({}, {}]",
        free_blocks, self.core.tgc, self.tagc
      );
      return Some(Trigger::Early);
    }

    None
  }

  fn read_trigger(&mut self, free_blocks: u32, now: u64) -> bool {
    if !self.read_triggered_enabled {
      return false;
    }

    let interval = if self.core.last_request_time > 0 {
      now.saturating_sub(self.core.last_request_time)
    } else {
      0
    };
    let idle = interval > 0 && curr_interval_bin(interval) > READ_IDLE_BIN;

    if idle && free_blocks as f64 <= self.core.tgc as f64 * READ_TRIGGER_FACTOR {
      self.stats.read_triggered_gc += 1;
      debug!(
        "rl-aggressive: read trigger, {} free <= {:.1}, interval {}ns",
        free_blocks,
        self.core.tgc as f64 * READ_TRIGGER_FACTOR,
        interval
      );
      return true;
    }

    false
  }

  fn action(&mut self, free_blocks: u32, trigger: Trigger) -> u32 {
    let action = match trigger {
      Trigger::Intensive => {
        self.stats.intensive_gc += 1;
        self.core.max_page_copies
      }
      Trigger::Early => self.core.select().min(self.max_gc_ops),
      _ => {
        if free_blocks <= self.core.tigc + 2 {
          // Near-critical: skip the Q-table and copy the maximum.
          // 接近危急：跳过 Q 表直接复制上限。
          self.core.max_page_copies
        } else {
          let floor = self.core.max_page_copies / 2;
          self.core.select().max(floor).min(self.core.max_page_copies)
        }
      }
    };

    self.core.schedule(action);
    action
  }

  fn on_response(&mut self, response_ns: u64, now: u64) {
    self.last_now = now;
    let due = self.metrics.record(response_ns);
    self.core.refresh_thresholds(&self.metrics);
    self.core.process_pending(response_ns, &self.metrics);

    self.stats.avg_reward = self.core.avg_reward;
    self.stats.reward_count = self.core.reward_count;
    self.stats.avg_response_ns = self.metrics.avg_response();

    if due {
      self.emit_row(now);
    }
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
    self.emit_row(self.last_now);

    let s = &self.stats;
    let avg_per_gc = if s.gc_invocations > 0 {
      s.total_page_copies as f64 / s.gc_invocations as f64
    } else {
      0.0
    };

    self.metrics.write_summary(&format!(
      "RL-Aggressive GC Policy Summary Report\n\
       ======================================\n\
       Final Mode: {}\n\n\
       Simulation Parameters:\n\
       ---------------------\n\
       Regular GC Threshold: {} free blocks\n\
       Intensive GC Threshold: {} free blocks\n\
       TAGC Threshold: {} free blocks\n\
       Max Page Copies per GC: {} pages\n\
       Max GC Operations: {}\n\
       Read-Triggered GC: {}\n\n\
       GC Statistics:\n\
       -------------\n\
       Total GC Invocations: {}\n\
       Total Pages Copied: {}\n\
       Intensive GC Count: {}\n\
       Read-Triggered GC Count: {}\n\
       Early GC Count: {}\n\
       Block Erasures: {}\n\n\
       Performance Metrics:\n\
       -------------------\n\
       Average Response Time: {:.2} ns\n\
       P99 Latency: {} ns\n\
       P99.9 Latency: {} ns\n\
       P99.99 Latency: {} ns\n\n\
       Efficiency Metrics:\n\
       ------------------\n\
       Average Pages Copied per GC: {:.2}\n\
       Average Reward: {:.4}\n",
      if self.in_intensive {
        "Intensive GC mode (ended in intensive mode)"
      } else {
        "Normal mode"
      },
      self.core.tgc,
      self.core.tigc,
      self.tagc,
      self.core.max_page_copies,
      self.max_gc_ops,
      if self.read_triggered_enabled { "Enabled" } else { "Disabled" },
      s.gc_invocations,
      s.total_page_copies,
      s.intensive_gc,
      s.read_triggered_gc,
      s.early_gc,
      s.erases,
      self.metrics.avg_response(),
      self.metrics.latency_percentile(0.99),
      self.metrics.latency_percentile(0.999),
      self.metrics.latency_percentile(0.9999),
      avg_per_gc,
      s.avg_reward,
    ));

    if let Some(dir) = &self.metrics_dir {
      self.core.dump_debug(dir, self.last_now);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn conf() -> FtlConf {
    let mut c = FtlConf::default();
    c.policy = crate::conf::GcPolicyKind::RlAggressive;
    c
  }

  #[test]
  fn early_gc_between_tgc_and_tagc() {
    let mut p = RlAggressiveGc::new(&conf());

    p.should_trigger(50, 1_000);
    assert_eq!(p.should_trigger(50, 200_000), Some(Trigger::Early));
    assert_eq!(p.stats().early_gc, 1);

    let a = p.action(50, Trigger::Early);
    assert!(a <= 2);
  }

  #[test]
  fn tagc_boundary_is_inclusive() {
    let mut p = RlAggressiveGc::new(&conf());
    p.should_trigger(100, 1_000);
    assert_eq!(p.should_trigger(100, 200_000), Some(Trigger::Early));

    let mut p = RlAggressiveGc::new(&conf());
    p.should_trigger(101, 1_000);
    assert!(p.should_trigger(101, 200_000).is_none());
  }

  #[test]
  fn normal_action_respects_half_max_floor() {
    let mut p = RlAggressiveGc::new(&conf());
    p.should_trigger(10, 1_000);
    p.should_trigger(10, 200_000);

    for _ in 0..50 {
      let a = p.action(10, Trigger::Normal);
      assert!(a >= 5 && a <= 10);
    }
  }

  #[test]
  fn intensive_returns_max_page_copies() {
    let mut p = RlAggressiveGc::new(&conf());
    p.should_trigger(3, 1_000);
    assert!(p.in_intensive_mode());
    assert_eq!(p.action(3, Trigger::Intensive), 10);
    assert_eq!(p.stats().intensive_gc, 1);
  }

  #[test]
  fn read_trigger_needs_idle_and_low_free_blocks() {
    let mut p = RlAggressiveGc::new(&conf());

    // Seed the last-request time, then read after a long idle gap.
    p.should_trigger(200, 1_000);
    assert!(p.read_trigger(14, 1_000 + 50_000));
    assert_eq!(p.stats().read_triggered_gc, 1);

    // 16 free blocks: above 1.5 * tgc.
    assert!(!p.read_trigger(16, 1_000 + 100_000));

    // Idle bin too small (10µs -> bin 2).
    p.should_trigger(200, 2_000_000);
    assert!(!p.read_trigger(14, 2_000_000 + 9_999));
  }

  #[test]
  fn read_trigger_can_be_disabled() {
    let mut c = conf();
    c.aggressive.read_triggered_gc = false;

    let mut p = RlAggressiveGc::new(&c);
    p.should_trigger(200, 1_000);
    assert!(!p.read_trigger(14, 1_000 + 50_000));
    assert_eq!(p.stats().read_triggered_gc, 0);
  }
}
