//! Discretization of raw observations into Q-table state bins.
//! 将原始观测离散化为 Q 表状态分桶。

/// Boundary between a "short" and a "long" previous interval: 100µs.
/// “短”与“长”前一间隔的分界：100µs。
pub const SHORT_INTERVAL_NS: u64 = 100_000;

/// Bin edges for the current inter-request interval, 10µs .. 1s.
/// Intervals below edge `i` land in bin `i + 1`; bin 0 is the zero
/// interval, bin 17 is ≥ 1s.
/// 当前请求间隔的分桶边界，10µs .. 1s。小于边界 `i` 的间隔落入
/// `i + 1` 号桶；0 号桶表示零间隔，17 号桶表示 ≥ 1s。
pub const CURR_INTERVAL_EDGES_NS: [u64; 16] = [
  10_000,        // 10µs
  20_000,        // 20µs
  50_000,        // 50µs
  100_000,       // 100µs
  200_000,       // 200µs
  500_000,       // 500µs
  1_000_000,     // 1ms
  2_000_000,     // 2ms
  5_000_000,     // 5ms
  10_000_000,    // 10ms
  20_000_000,    // 20ms
  50_000_000,    // 50ms
  100_000_000,   // 100ms
  200_000_000,   // 200ms
  500_000_000,   // 500ms
  1_000_000_000, // 1s
];

/// Discretized decision state: previous-interval bin (0..=1),
/// current-interval bin (0..=17), previous-action bin (0..=1).
/// 离散化的决策状态：前一间隔桶 (0..=1)、当前间隔桶 (0..=17)、
/// 上一动作桶 (0..=1)。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct State {
  pub prev_interval_bin: u8,
  pub curr_interval_bin: u8,
  pub prev_action_bin: u8,
}

impl State {
  #[inline]
  #[must_use]
  pub fn new(prev_interval_bin: u8, curr_interval_bin: u8, prev_action_bin: u8) -> Self {
    Self {
      prev_interval_bin,
      curr_interval_bin,
      prev_action_bin,
    }
  }

  /// Build a state from raw observations.
  /// 从原始观测构造状态。
  #[inline]
  #[must_use]
  pub fn from_raw(prev_interval_ns: u64, curr_interval_ns: u64, action: u32, max_action: u32) -> Self {
    Self {
      prev_interval_bin: prev_interval_bin(prev_interval_ns),
      curr_interval_bin: curr_interval_bin(curr_interval_ns),
      prev_action_bin: action_bin(action, max_action),
    }
  }
}

/// Two bins: short (< 100µs) or long.
/// 两个桶：短（< 100µs）或长。
#[inline]
#[must_use]
pub fn prev_interval_bin(interval_ns: u64) -> u8 {
  if interval_ns < SHORT_INTERVAL_NS { 0 } else { 1 }
}

/// Eighteen bins over the current interval, see [`CURR_INTERVAL_EDGES_NS`].
/// 当前间隔的十八个分桶，见 [`CURR_INTERVAL_EDGES_NS`]。
#[must_use]
pub fn curr_interval_bin(interval_ns: u64) -> u8 {
  if interval_ns == 0 {
    return 0;
  }

  for (i, &edge) in CURR_INTERVAL_EDGES_NS.iter().enumerate() {
    if interval_ns < edge {
      return i as u8 + 1;
    }
  }

  17
}

/// Two bins: at most half of the maximum action, or above it.
/// 两个桶：不超过最大动作的一半，或超过一半。
#[inline]
#[must_use]
pub fn action_bin(action: u32, max_action: u32) -> u8 {
  if action <= max_action / 2 { 0 } else { 1 }
}
