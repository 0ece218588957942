//! Tabular Q-learning with ε-greedy selection and convergence tracking.
//! 表格型 Q 学习，带 ε-贪心选择与收敛跟踪。

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rapidhash::RapidHashMap;

use crate::state::State;

/// Floor of the exploration rate.
/// 探索率的下限。
pub const MIN_EPSILON: f32 = 0.01;

/// Per-decision multiplicative ε decay during the warm phase.
/// 预热阶段每次决策的 ε 乘法衰减。
pub const EPSILON_DECAY: f32 = 0.998;

/// Number of GC decisions after which ε is clamped to the floor.
/// 经过多少次 GC 决策后 ε 被钳制到下限。
pub const EPSILON_CLAMP_AFTER: u64 = 1000;

/// Convergence is declared when the max Q-delta stays below this bound.
/// 当最大 Q 变化量持续低于该界限时判定收敛。
pub const CONVERGENCE_DELTA: f32 = 0.01;

/// ... and at least this fraction of states keeps its argmax.
/// …… 且至少该比例的状态保持 argmax 不变。
pub const CONVERGENCE_STABLE_RATIO: f32 = 0.95;

const DELTA_WINDOW: usize = 100;
const HISTORY_CAP: usize = 1024;

/// One convergence observation, taken after a Q-update.
/// 一次 Q 更新后的收敛观测。
#[derive(Clone, Copy, Debug)]
pub struct ConvergenceSample {
  pub update: u64,
  pub max_delta: f32,
  pub stable_ratio: f32,
  pub converged: bool,
}

/// State → action-value table. States appear lazily: the first touch of a
/// state inserts an all-zero value vector of length `num_actions`.
/// 状态 → 动作价值表。状态按需出现：首次访问某状态时插入长度为
/// `num_actions` 的全零价值向量。
pub struct QTable {
  table: RapidHashMap<State, Vec<f32>>,
  alpha: f32,
  gamma: f32,
  epsilon: f32,
  init_epsilon: f32,
  num_actions: u32,
  gc_count: u64,
  update_count: u64,
  rng: StdRng,

  // Snapshot of the table before the latest update, for the max-delta and
  // argmax-stability convergence metrics.
  // 最近一次更新前的表快照，用于最大变化量与 argmax 稳定性收敛指标。
  snapshot: RapidHashMap<State, Vec<f32>>,
  deltas: VecDeque<f32>,
  history: VecDeque<ConvergenceSample>,
  converged: bool,
}

impl QTable {
  /// `init_epsilon` outside (0, 1] falls back to 0.8.
  /// `init_epsilon` 不在 (0, 1] 内时回退为 0.8。
  #[must_use]
  pub fn new(alpha: f32, gamma: f32, init_epsilon: f32, num_actions: u32, seed: u64) -> Self {
    let epsilon = if init_epsilon > 0.0 && init_epsilon <= 1.0 {
      init_epsilon
    } else {
      log::warn!("qtable: init epsilon {} out of (0, 1], using 0.8", init_epsilon);
      0.8
    };

    debug!(
      "qtable: init alpha={} gamma={} epsilon={} actions={}",
      alpha, gamma, epsilon, num_actions
    );

    Self {
      table: RapidHashMap::default(),
      alpha,
      gamma,
      epsilon,
      init_epsilon: epsilon,
      num_actions,
      gc_count: 0,
      update_count: 0,
      rng: StdRng::seed_from_u64(seed),
      snapshot: RapidHashMap::default(),
      deltas: VecDeque::with_capacity(DELTA_WINDOW),
      history: VecDeque::with_capacity(HISTORY_CAP),
      converged: false,
    }
  }

  /// ε-greedy action selection. Counts one GC decision; after
  /// [`EPSILON_CLAMP_AFTER`] decisions ε is pinned to [`MIN_EPSILON`].
  /// ε-贪心动作选择。计一次 GC 决策；超过 [`EPSILON_CLAMP_AFTER`]
  /// 次后 ε 固定为 [`MIN_EPSILON`]。
  pub fn select_action(&mut self, state: State) -> u32 {
    self.gc_count += 1;

    if self.gc_count >= EPSILON_CLAMP_AFTER && self.epsilon > MIN_EPSILON {
      self.epsilon = MIN_EPSILON;
      debug!("qtable: epsilon clamped to {} after {} decisions", self.epsilon, self.gc_count);
    }

    if self.rng.random::<f32>() < self.epsilon {
      let action = self.rng.random_range(0..self.num_actions);
      debug!("qtable: explore state={:?} action={}", state, action);
      return action;
    }

    let num_actions = self.num_actions;
    let values = self
      .table
      .entry(state)
      .or_insert_with(|| vec![0.0; num_actions as usize]);

    let action = argmax(values);
    debug!(
      "qtable: exploit state={:?} action={} q={}",
      state, action, values[action as usize]
    );
    action
  }

  /// Standard Q-learning update:
  /// `Q[s][a] += α·(r + γ·max_a' Q[s'][a'] − Q[s][a])`.
  /// 标准 Q 学习更新。
  pub fn update(&mut self, state: State, action: u32, reward: f32, next: State) {
    let action = action.min(self.num_actions - 1) as usize;
    let num_actions = self.num_actions as usize;

    self
      .table
      .entry(next)
      .or_insert_with(|| vec![0.0; num_actions]);
    let max_next = self.table[&next].iter().copied().fold(f32::MIN, f32::max);

    let values = self
      .table
      .entry(state)
      .or_insert_with(|| vec![0.0; num_actions]);
    let current = values[action];
    let updated = current + self.alpha * (reward + self.gamma * max_next - current);
    values[action] = updated;

    debug!(
      "qtable: update state={:?} action={} reward={} q {} -> {}",
      state, action, reward, current, updated
    );

    self.update_count += 1;
    self.track_convergence();
  }

  /// Q-value for a (state, action) pair; 0 for unknown states.
  /// (状态, 动作) 的 Q 值；未知状态返回 0。
  #[must_use]
  pub fn q_value(&self, state: State, action: u32) -> f32 {
    match self.table.get(&state) {
      Some(values) if (action as usize) < values.len() => values[action as usize],
      _ => 0.0,
    }
  }

  /// Slow multiplicative decay, active only during the warm phase.
  /// 慢速乘法衰减，仅在预热阶段生效。
  pub fn decay_epsilon(&mut self) {
    if self.gc_count < EPSILON_CLAMP_AFTER && self.epsilon > MIN_EPSILON {
      self.epsilon = (self.epsilon * EPSILON_DECAY).max(MIN_EPSILON);
    }
  }

  #[inline]
  #[must_use]
  pub fn epsilon(&self) -> f32 {
    self.epsilon
  }

  #[inline]
  #[must_use]
  pub fn init_epsilon(&self) -> f32 {
    self.init_epsilon
  }

  #[inline]
  #[must_use]
  pub fn gc_count(&self) -> u64 {
    self.gc_count
  }

  #[inline]
  #[must_use]
  pub fn num_actions(&self) -> u32 {
    self.num_actions
  }

  /// Number of states touched so far.
  /// 目前已出现的状态数。
  #[inline]
  #[must_use]
  pub fn states(&self) -> usize {
    self.table.len()
  }

  #[inline]
  #[must_use]
  pub fn converged(&self) -> bool {
    self.converged
  }

  /// Max absolute Q change observed by the latest update.
  /// 最近一次更新观测到的最大 Q 变化量。
  #[must_use]
  pub fn last_max_delta(&self) -> f32 {
    self.deltas.back().copied().unwrap_or(0.0)
  }

  fn track_convergence(&mut self) {
    let mut max_delta = 0.0f32;
    let mut stable = 0usize;

    for (state, values) in &self.table {
      match self.snapshot.get(state) {
        Some(old) => {
          for (new_q, old_q) in values.iter().zip(old.iter()) {
            max_delta = max_delta.max((new_q - old_q).abs());
          }
          if argmax(values) == argmax(old) {
            stable += 1;
          }
        }
        // A brand-new state counts as an unstable argmax.
        // 新出现的状态视为 argmax 不稳定。
        None => {
          for q in values {
            max_delta = max_delta.max(q.abs());
          }
        }
      }
    }

    let stable_ratio = if self.table.is_empty() {
      0.0
    } else {
      stable as f32 / self.table.len() as f32
    };

    if self.deltas.len() == DELTA_WINDOW {
      self.deltas.pop_front();
    }
    self.deltas.push_back(max_delta);

    let window_max = self.deltas.iter().copied().fold(0.0f32, f32::max);
    self.converged = window_max < CONVERGENCE_DELTA && stable_ratio >= CONVERGENCE_STABLE_RATIO;

    if self.history.len() == HISTORY_CAP {
      self.history.pop_front();
    }
    self.history.push_back(ConvergenceSample {
      update: self.update_count,
      max_delta,
      stable_ratio,
      converged: self.converged,
    });

    self.snapshot = self.table.clone();
  }

  /// Dump the table as CSV: state bins plus one column per action.
  /// 将 Q 表导出为 CSV：状态分桶加每个动作一列。
  pub fn dump_q_csv(&self, path: &Path) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);

    write!(w, "prev_interval_bin,curr_interval_bin,prev_action_bin")?;
    for a in 0..self.num_actions {
      write!(w, ",q{}", a)?;
    }
    writeln!(w)?;

    let mut states: Vec<&State> = self.table.keys().collect();
    states.sort_by_key(|s| (s.prev_interval_bin, s.curr_interval_bin, s.prev_action_bin));

    for state in states {
      write!(
        w,
        "{},{},{}",
        state.prev_interval_bin, state.curr_interval_bin, state.prev_action_bin
      )?;
      for q in &self.table[state] {
        write!(w, ",{:.6}", q)?;
      }
      writeln!(w)?;
    }

    w.flush()
  }

  /// Dump the recent convergence history as CSV.
  /// 将近期收敛历史导出为 CSV。
  pub fn dump_convergence_csv(&self, path: &Path) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);

    writeln!(w, "update,max_delta,stable_ratio,converged")?;
    for s in &self.history {
      writeln!(
        w,
        "{},{:.6},{:.4},{}",
        s.update, s.max_delta, s.stable_ratio, s.converged as u8
      )?;
    }

    w.flush()
  }
}

#[inline]
fn argmax(values: &[f32]) -> u32 {
  let mut best = 0;
  for (i, v) in values.iter().enumerate().skip(1) {
    if *v > values[best] {
      best = i;
    }
  }
  best as u32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lazy_state_insertion_keeps_shape() {
    let mut q = QTable::new(0.3, 0.8, 0.01, 10, 7);
    let s = State::new(0, 3, 1);

    q.update(s, 4, 1.0, State::new(1, 3, 0));
    assert_eq!(q.states(), 2);
    assert!(q.q_value(s, 4) > 0.0);
    assert_eq!(q.q_value(State::new(1, 3, 0), 0), 0.0);
  }

  #[test]
  fn update_matches_closed_form() {
    let mut q = QTable::new(0.5, 0.9, 0.8, 4, 1);
    let s = State::new(0, 1, 0);
    let next = State::new(1, 2, 0);

    // Empty table: maxNextQ = 0, so Q = 0 + 0.5 * (1 - 0) = 0.5.
    q.update(s, 2, 1.0, next);
    assert!((q.q_value(s, 2) - 0.5).abs() < 1e-6);

    // Second update: Q = 0.5 + 0.5 * (1 + 0.9 * 0 - 0.5) = 0.75.
    q.update(s, 2, 1.0, next);
    assert!((q.q_value(s, 2) - 0.75).abs() < 1e-6);
  }

  #[test]
  fn epsilon_clamps_after_warm_phase() {
    let mut q = QTable::new(0.3, 0.8, 0.8, 4, 42);
    let s = State::default();

    for _ in 0..EPSILON_CLAMP_AFTER + 1 {
      q.select_action(s);
      q.decay_epsilon();
    }

    assert!((q.epsilon() - MIN_EPSILON).abs() < f32::EPSILON);
  }

  #[test]
  fn epsilon_stays_in_bounds_during_decay() {
    let mut q = QTable::new(0.3, 0.8, 0.8, 4, 42);
    for _ in 0..200 {
      q.decay_epsilon();
      assert!(q.epsilon() >= MIN_EPSILON);
      assert!(q.epsilon() <= 0.8);
    }
  }

  #[test]
  fn invalid_init_epsilon_falls_back() {
    let q = QTable::new(0.3, 0.8, 0.0, 4, 42);
    assert!((q.epsilon() - 0.8).abs() < f32::EPSILON);

    let q = QTable::new(0.3, 0.8, 1.5, 4, 42);
    assert!((q.epsilon() - 0.8).abs() < f32::EPSILON);
  }

  #[test]
  fn converges_on_repeated_identical_updates() {
    let mut q = QTable::new(0.5, 0.0, 0.5, 2, 3);
    let s = State::new(0, 1, 0);

    // Reward 1 with gamma 0: Q -> 1 geometrically; deltas shrink below the
    // convergence bound.
    for _ in 0..DELTA_WINDOW + 200 {
      q.update(s, 0, 1.0, s);
    }

    assert!(q.converged());
    assert!(q.last_max_delta() < CONVERGENCE_DELTA);
  }
}
