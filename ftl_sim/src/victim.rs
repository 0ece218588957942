//! GC victim selection: greedy, cost-benefit, random and d-choice scoring
//! over sealed blocks.
//! GC 牺牲块选择：对封口块进行贪心、成本收益、随机与 d-choice 评分。

use std::cmp::Ordering;

use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use rapidhash::RapidHashMap;

use crate::block::Block;
use crate::conf::EvictPolicy;

/// Pick up to `n` victim block indices. Only sealed blocks are candidates;
/// blocks in `exclude` (the open write-stream blocks) never are. Smaller
/// weight wins, ties break by block index.
/// 选出至多 `n` 个牺牲块索引。只有封口块是候选；`exclude` 中的块
/// （打开的写流块）永远不是。权重小者胜出，平局按块索引决定。
pub fn select_victims(
  blocks: &RapidHashMap<u32, Block>,
  policy: EvictPolicy,
  n: usize,
  d_choice: u32,
  pages_in_block: u32,
  now: u64,
  exclude: &[u32],
  rng: &mut StdRng,
) -> Vec<u32> {
  let mut weight = calculate_weight(blocks, policy, pages_in_block, now, exclude);

  if matches!(policy, EvictPolicy::Random | EvictPolicy::DChoice) {
    let take = match policy {
      EvictPolicy::Random => n,
      _ => d_choice as usize * n,
    };
    weight = sample_distinct(&weight, take.min(weight.len()), rng);
  }

  weight.sort_by(|a, b| {
    a.1
      .partial_cmp(&b.1)
      .unwrap_or(Ordering::Equal)
      .then(a.0.cmp(&b.0))
  });

  let picked: Vec<u32> = weight.into_iter().take(n).map(|(idx, _)| idx).collect();
  debug!("victim: policy={:?} requested={} picked={:?}", policy, n, picked);
  picked
}

/// Weight every sealed block under the active policy. Candidates come out
/// ordered by block index so downstream ties are deterministic.
/// 按当前策略为每个封口块计算权重。候选按块索引排序，下游平局处理
/// 因而是确定性的。
fn calculate_weight(
  blocks: &RapidHashMap<u32, Block>,
  policy: EvictPolicy,
  pages_in_block: u32,
  now: u64,
  exclude: &[u32],
) -> Vec<(u32, f32)> {
  let mut weight: Vec<(u32, f32)> = Vec::with_capacity(blocks.len());

  let mut sealed: Vec<&Block> = blocks
    .values()
    .filter(|b| b.is_sealed() && !exclude.contains(&b.index()))
    .collect();
  sealed.sort_by_key(|b| b.index());

  for block in sealed {
    let w = match policy {
      EvictPolicy::Greedy | EvictPolicy::Random | EvictPolicy::DChoice => {
        block.valid_subunits() as f32
      }
      EvictPolicy::CostBenefit => {
        let u = block.valid_pages() as f32 / pages_in_block as f32;
        let age = now.saturating_sub(block.last_accessed()) as f32;
        u / ((1.0 - u) * age)
      }
    };
    weight.push((block.index(), w));
  }

  weight
}

/// Uniform distinct sampling with an explicit picked flag per slot.
/// 使用每槽显式“已选”标记的均匀去重采样。
fn sample_distinct(weight: &[(u32, f32)], take: usize, rng: &mut StdRng) -> Vec<(u32, f32)> {
  let mut picked = vec![false; weight.len()];
  let mut selected = Vec::with_capacity(take);

  while selected.len() < take {
    let idx = rng.random_range(0..weight.len());
    if !picked[idx] {
      picked[idx] = true;
      selected.push(weight[idx]);
    }
  }

  selected
}
