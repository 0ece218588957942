//! Q-learning GC: the shared RL controller plus the baseline and intensive
//! policy variants.
//! Q 学习 GC：共享的 RL 控制器以及基线与强化两个策略变体。
//!
//! The controller observes inter-request intervals, picks a page-copy
//! budget per trigger, and settles the delayed Q-update when the next I/O
//! completion delivers its response time.
//! 控制器观测请求间隔，每次触发选择页复制预算，并在下一次 I/O 完成
//! 送达响应时间时结算延迟的 Q 更新。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use ftl_rl::{QTable, State};
use log::{debug, warn};

use crate::conf::{FtlConf, RlConf};
use crate::metrics::Metrics;
use crate::policy::{GcPolicy, PolicyStats, Trigger};

/// Pages copied per intensive-mode invocation.
/// 强化模式每次调用复制的页数。
pub const INTENSIVE_PAGE_COPIES: u32 = 7;

const RING: usize = 1000;
const RL_COLUMNS: &str = "<timestamp> <gc_invocations> <page_copies> <intensive_gc_count> \
<erases> <avg_reward> <avg_response_time> <p99_latency> <p99.9_latency> <p99.99_latency>";

/// State tracking, reward computation and the pending-update protocol
/// shared by all RL policies.
/// 所有 RL 策略共享的状态跟踪、奖励计算与待定更新协议。
pub(crate) struct RlCore {
  pub q: QTable,
  pub tgc: u32,
  pub tigc: u32,
  pub max_page_copies: u32,

  pub last_action: u32,
  pub last_request_time: u64,
  pub prev_interval: u64,
  pub curr_interval: u64,
  pub state: State,
  pending: Option<(State, u32)>,

  // Reward thresholds, refreshed from the response-time ring.
  // 奖励阈值，从响应时间环刷新。
  pub t1: u64,
  pub t2: u64,
  pub t3: u64,

  pub avg_reward: f32,
  pub reward_count: u64,
  cumulative_reward: f64,

  debug: bool,
  reward_log: Option<PathBuf>,
}

impl RlCore {
  pub fn new(rl: &RlConf, seed: u64, metrics_dir: Option<&Path>) -> Self {
    let reward_log = if rl.debug_enable {
      metrics_dir.map(|dir| {
        let path = dir.join("rl_gc_reward_log.csv");
        if let Err(e) = std::fs::write(
          &path,
          "Iteration,Action,Reward,CumulativeReward,AverageReward,t1,t2,t3\n",
        ) {
          warn!("rl-gc: failed to initialize reward log {:?}: {}", path, e);
        }
        path
      })
    } else {
      None
    };

    Self {
      q: QTable::new(
        rl.learning_rate,
        rl.discount_factor,
        rl.init_epsilon,
        rl.num_actions,
        seed,
      ),
      tgc: rl.tgc_threshold,
      tigc: rl.tigc_threshold,
      max_page_copies: rl.max_page_copies,
      last_action: 0,
      last_request_time: 0,
      prev_interval: 0,
      curr_interval: 0,
      state: State::default(),
      pending: None,
      t1: 0,
      t2: 0,
      t3: 0,
      avg_reward: 0.0,
      reward_count: 0,
      cumulative_reward: 0.0,
      debug: rl.debug_enable,
      reward_log,
    }
  }

  /// Shift the interval pair on an I/O arrival at `now`.
  /// 在 `now` 时刻的 I/O 到达上滚动间隔对。
  pub fn observe(&mut self, now: u64) {
    if self.last_request_time > 0 {
      self.prev_interval = self.curr_interval;
      self.curr_interval = now.saturating_sub(self.last_request_time);
    } else {
      // First request: no interval yet.
      // 第一个请求：还没有间隔。
      self.prev_interval = 0;
      self.curr_interval = 0;
    }
    self.last_request_time = now;
  }

  /// Rebuild the decision state from the current observations.
  /// 用当前观测重建决策状态。
  pub fn update_state(&mut self) {
    self.state = State::from_raw(
      self.prev_interval,
      self.curr_interval,
      self.last_action,
      self.max_page_copies,
    );
  }

  /// ε-greedy selection capped at the page-copy maximum.
  /// ε-贪心选择，封顶为页复制上限。
  pub fn select(&mut self) -> u32 {
    self.q.select_action(self.state).min(self.max_page_copies)
  }

  /// Remember the chosen (state, action) until the next response arrives.
  /// 记住所选 (状态, 动作)，直到下一次响应到达。
  pub fn schedule(&mut self, action: u32) {
    self.last_action = action;
    self.pending = Some((self.state, action));
  }

  #[inline]
  pub fn has_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Settle the pending Q-update with the response time of the I/O that
  /// just completed.
  /// 用刚完成 I/O 的响应时间结算待定 Q 更新。
  pub fn process_pending(&mut self, response_ns: u64, metrics: &Metrics) {
    let Some((state, action)) = self.pending.take() else {
      return;
    };

    let reward = self.reward(response_ns, metrics);
    let next = State::from_raw(
      self.prev_interval,
      self.curr_interval,
      action,
      self.max_page_copies,
    );

    debug!(
      "rl-gc: pending update state={:?} action={} reward={} next={:?}",
      state, action, reward, next
    );

    self.q.update(state, action, reward, next);

    self.avg_reward =
      (self.avg_reward * self.reward_count as f32 + reward) / (self.reward_count + 1) as f32;
    self.reward_count += 1;
    self.cumulative_reward += reward as f64;

    self.q.decay_epsilon();
    self.append_reward_log(action, reward);
  }

  /// Percentile-banded reward once the ring is warm, a fixed ladder before.
  /// 环预热后按分位数分段的奖励，之前使用固定阶梯。
  pub fn reward(&self, response_ns: u64, metrics: &Metrics) -> f32 {
    if metrics.samples() < crate::metrics::MIN_SAMPLES {
      return if response_ns < 100_000 {
        1.0
      } else if response_ns < 1_000_000 {
        0.5
      } else if response_ns < 10_000_000 {
        0.0
      } else {
        -0.5
      };
    }

    if response_ns <= self.t1 {
      1.0
    } else if response_ns <= self.t2 {
      0.5
    } else if response_ns <= self.t3 {
      -0.5
    } else {
      -1.0
    }
  }

  /// t1/t2/t3 = 70th/90th/99th percentiles of the response ring.
  /// t1/t2/t3 = 响应环的 70/90/99 分位数。
  pub fn refresh_thresholds(&mut self, metrics: &Metrics) {
    if let Some((t1, t2, t3)) = metrics.reward_thresholds() {
      self.t1 = t1;
      self.t2 = t2;
      self.t3 = t3;
    }
  }

  fn append_reward_log(&self, action: u32, reward: f32) {
    let Some(path) = &self.reward_log else {
      return;
    };

    let avg = if self.reward_count > 0 {
      self.cumulative_reward / self.reward_count as f64
    } else {
      0.0
    };
    let line = format!(
      "{},{},{:.4},{:.4},{:.4},{},{},{}",
      self.reward_count, action, reward, self.cumulative_reward, avg, self.t1, self.t2, self.t3
    );

    let result = OpenOptions::new()
      .append(true)
      .create(true)
      .open(path)
      .and_then(|mut f| writeln!(f, "{}", line));
    if let Err(e) = result {
      warn!("rl-gc: reward log append failed: {}", e);
    }
  }

  /// Q-table and convergence CSV dumps for offline debugging.
  /// 供离线调试的 Q 表与收敛 CSV 导出。
  pub fn dump_debug(&self, dir: &Path, now: u64) {
    if !self.debug {
      return;
    }

    let q_path = dir.join(format!("q_table_{}.csv", now));
    if let Err(e) = self.q.dump_q_csv(&q_path) {
      warn!("rl-gc: q-table dump to {:?} failed: {}", q_path, e);
    }

    let c_path = dir.join(format!("convergence_{}.csv", now));
    if let Err(e) = self.q.dump_convergence_csv(&c_path) {
      warn!("rl-gc: convergence dump to {:?} failed: {}", c_path, e);
    }
  }
}

fn emit_rl_row(metrics: &Metrics, stats: &PolicyStats, now: u64) {
  metrics.append_row(&[
    now.to_string(),
    stats.gc_invocations.to_string(),
    stats.total_page_copies.to_string(),
    stats.intensive_gc.to_string(),
    stats.erases.to_string(),
    format!("{:.4}", stats.avg_reward),
    format!("{:.2}", metrics.avg_response()),
    metrics.latency_percentile(0.99).to_string(),
    metrics.latency_percentile(0.999).to_string(),
    metrics.latency_percentile(0.9999).to_string(),
  ]);
}

fn rl_summary(
  title: &str,
  mode_note: Option<&str>,
  core: &RlCore,
  metrics: &Metrics,
  stats: &PolicyStats,
) -> String {
  let avg_per_gc = if stats.gc_invocations > 0 {
    stats.total_page_copies as f64 / stats.gc_invocations as f64
  } else {
    0.0
  };
  let intensive_pct = if stats.gc_invocations > 0 {
    stats.intensive_gc as f64 * 100.0 / stats.gc_invocations as f64
  } else {
    0.0
  };

  let mut text = format!("{}\n{}\n", title, "=".repeat(title.len()));
  if let Some(note) = mode_note {
    text.push_str(note);
    text.push('\n');
  }

  text.push_str(&format!(
    "\nSimulation Parameters:\n\
     ---------------------\n\
     GC Threshold (TGC): {} free blocks\n\
     Intensive GC Threshold (TIGC): {} free blocks\n\
     Max Page Copies per GC: {} pages\n\
     Q-learning Epsilon: {:.4}\n\n\
     GC Statistics:\n\
     -------------\n\
     Total GC Invocations: {}\n\
     Total Pages Copied: {}\n\
     Intensive GC Operations: {}\n\
     Intensive GC %: {:.2}%\n\
     Average Pages per GC: {:.2}\n\
     Block Erasures: {}\n\n\
     RL Statistics:\n\
     -------------\n\
     Average Reward: {:.4}\n\
     Total Reward Count: {}\n\
     Q-table States: {}\n\
     Converged: {}\n\n\
     Performance Metrics:\n\
     -------------------\n\
     Average Response Time: {:.2} ns\n\
     P99 Latency: {} ns\n\
     P99.9 Latency: {} ns\n\
     P99.99 Latency: {} ns\n",
    core.tgc,
    core.tigc,
    core.max_page_copies,
    core.q.epsilon(),
    stats.gc_invocations,
    stats.total_page_copies,
    stats.intensive_gc,
    intensive_pct,
    avg_per_gc,
    stats.erases,
    stats.avg_reward,
    stats.reward_count,
    core.q.states(),
    core.q.converged(),
    metrics.avg_response(),
    metrics.latency_percentile(0.99),
    metrics.latency_percentile(0.999),
    metrics.latency_percentile(0.9999),
  ));

  text
}

/// ε-greedy Q-learning GC with an instantaneous intensive override.
/// 带即时强化覆盖的 ε-贪心 Q 学习 GC。
pub struct RlBaselineGc {
  core: RlCore,
  metrics: Metrics,
  stats: PolicyStats,
  last_now: u64,
  metrics_dir: Option<PathBuf>,
}

impl RlBaselineGc {
  #[must_use]
  pub fn new(conf: &FtlConf) -> Self {
    let mut metrics = Metrics::new(RING);
    if conf.rl.metrics_enable {
      if let Some(dir) = &conf.metrics_dir {
        metrics.enable_file(&dir.join("rl_baseline"), "RL-Baseline", RL_COLUMNS);
      }
    }

    Self {
      core: RlCore::new(&conf.rl, conf.seed.wrapping_add(1), conf.metrics_dir.as_deref()),
      metrics,
      stats: PolicyStats::default(),
      last_now: 0,
      metrics_dir: conf.metrics_dir.clone(),
    }
  }
}

impl GcPolicy for RlBaselineGc {
  fn name(&self) -> &'static str {
    "rl-baseline"
  }

  fn should_trigger(&mut self, free_blocks: u32, now: u64) -> Option<Trigger> {
    if free_blocks > self.core.tgc {
      return None;
    }

    self.core.observe(now);

    // The intensive override fires even without idle time.
    // 强化覆盖即使没有空闲时间也会触发。
    if free_blocks <= self.core.tigc {
      debug!("rl-baseline: intensive trigger, {} free <= tigc {}", free_blocks, self.core.tigc);
      return Some(Trigger::Intensive);
    }

    if self.core.curr_interval == 0 {
      return None;
    }

    self.core.update_state();
    debug!(
      "rl-baseline: trigger state={:?} free={} interval={}ns",
      self.core.state, free_blocks, self.core.curr_interval
    );
    Some(Trigger::Normal)
  }

  fn action(&mut self, _free_blocks: u32, trigger: Trigger) -> u32 {
    let action = match trigger {
      Trigger::Intensive => {
        self.stats.intensive_gc += 1;
        INTENSIVE_PAGE_COPIES
      }
      _ => self.core.select(),
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
      emit_rl_row(&self.metrics, &self.stats, now);
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
    emit_rl_row(&self.metrics, &self.stats, self.last_now);
    self.metrics.write_summary(&rl_summary(
      "RL-Baseline Policy Summary Report",
      None,
      &self.core,
      &self.metrics,
      &self.stats,
    ));

    if let Some(dir) = &self.metrics_dir {
      self.core.dump_debug(dir, self.last_now);
    }
  }
}

/// Baseline plus a latched intensive mode with explicit entry and exit.
/// 基线之上增加带显式进入/退出的锁存强化模式。
pub struct RlIntensiveGc {
  core: RlCore,
  metrics: Metrics,
  stats: PolicyStats,
  in_intensive: bool,
  last_now: u64,
  metrics_dir: Option<PathBuf>,
}

impl RlIntensiveGc {
  #[must_use]
  pub fn new(conf: &FtlConf) -> Self {
    let mut metrics = Metrics::new(RING);
    if conf.rl.metrics_enable {
      if let Some(dir) = &conf.metrics_dir {
        metrics.enable_file(&dir.join("rl_intensive"), "RL-Intensive", RL_COLUMNS);
      }
    }

    Self {
      core: RlCore::new(&conf.rl, conf.seed.wrapping_add(1), conf.metrics_dir.as_deref()),
      metrics,
      stats: PolicyStats::default(),
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

  fn set_intensive(&mut self, enable: bool) {
    if enable && !self.in_intensive {
      debug!("rl-intensive: entering intensive mode, tigc={}", self.core.tigc);
      self.in_intensive = true;
    } else if !enable && self.in_intensive {
      debug!("rl-intensive: exiting intensive mode, tigc={}", self.core.tigc);
      self.in_intensive = false;
    }
  }
}

impl GcPolicy for RlIntensiveGc {
  fn name(&self) -> &'static str {
    "rl-intensive"
  }

  fn should_trigger(&mut self, free_blocks: u32, now: u64) -> Option<Trigger> {
    if free_blocks > self.core.tgc {
      self.set_intensive(false);
      return None;
    }

    self.core.observe(now);

    if free_blocks <= self.core.tigc {
      self.set_intensive(true);
      return Some(Trigger::Intensive);
    }
    self.set_intensive(false);

    if self.core.curr_interval == 0 {
      return None;
    }

    self.core.update_state();
    Some(Trigger::Normal)
  }

  fn action(&mut self, _free_blocks: u32, trigger: Trigger) -> u32 {
    let action = match trigger {
      Trigger::Intensive => {
        self.stats.intensive_gc += 1;
        INTENSIVE_PAGE_COPIES
      }
      _ => self.core.select(),
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
      emit_rl_row(&self.metrics, &self.stats, now);
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
    emit_rl_row(&self.metrics, &self.stats, self.last_now);

    let note = if self.in_intensive {
      "Final Mode: Intensive GC mode (ended in intensive mode)"
    } else {
      "Final Mode: Normal mode"
    };
    self.metrics.write_summary(&rl_summary(
      "RL-Intensive GC Policy Summary Report",
      Some(note),
      &self.core,
      &self.metrics,
      &self.stats,
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
    FtlConf::default()
  }

  #[test]
  fn no_trigger_above_tgc() {
    let mut p = RlBaselineGc::new(&conf());
    assert!(p.should_trigger(11, 1_000).is_none());
    // Boundary: equality triggers once idle time exists.
    p.should_trigger(10, 1_000);
    assert_eq!(p.should_trigger(10, 2_000), Some(Trigger::Normal));
  }

  #[test]
  fn zero_interval_suppresses_normal_but_not_intensive() {
    let mut p = RlBaselineGc::new(&conf());

    // First call at tgc: no interval yet, no trigger.
    assert!(p.should_trigger(10, 1_000).is_none());
    // Same tick: zero interval.
    assert!(p.should_trigger(10, 1_000).is_none());
    // Below tigc the intensive override ignores the zero interval.
    assert_eq!(p.should_trigger(5, 1_000), Some(Trigger::Intensive));
  }

  #[test]
  fn intensive_action_is_fixed_and_counted() {
    let mut p = RlBaselineGc::new(&conf());
    let a = p.action(3, Trigger::Intensive);
    assert_eq!(a, INTENSIVE_PAGE_COPIES);
    assert_eq!(p.stats().intensive_gc, 1);
    assert!(p.core.has_pending());
  }

  #[test]
  fn normal_action_is_capped() {
    let mut conf = conf();
    conf.rl.num_actions = 10;
    conf.rl.max_page_copies = 4;

    let mut p = RlBaselineGc::new(&conf);
    p.should_trigger(10, 1_000);
    p.should_trigger(10, 50_000);
    for _ in 0..50 {
      let a = p.action(8, Trigger::Normal);
      assert!(a <= 4);
    }
  }

  #[test]
  fn pending_update_settles_on_next_response() {
    let mut p = RlBaselineGc::new(&conf());
    p.should_trigger(10, 1_000);
    assert_eq!(p.should_trigger(10, 200_000), Some(Trigger::Normal));
    let _ = p.action(10, Trigger::Normal);
    assert!(p.core.has_pending());

    p.on_response(50_000, 300_000);
    assert!(!p.core.has_pending());
    assert_eq!(p.stats().reward_count, 1);
  }

  #[test]
  fn intensive_mode_latches_and_exits() {
    let mut p = RlIntensiveGc::new(&conf());

    p.should_trigger(10, 1_000);
    assert_eq!(p.should_trigger(5, 2_000), Some(Trigger::Intensive));
    assert!(p.in_intensive_mode());

    // Boundary: one above tigc exits the mode.
    assert_eq!(p.should_trigger(6, 3_000), Some(Trigger::Normal));
    assert!(!p.in_intensive_mode());
  }
}
