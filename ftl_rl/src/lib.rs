//! Q-learning core for garbage-collection policy simulation.
//! 垃圾回收策略模拟的 Q 学习核心。
//!
//! The decision state is built from discretized inter-request intervals and
//! the previous action; the Q-table learns how many pages a GC invocation
//! should copy for that state.
//! 决策状态由离散化的请求间隔和上一个动作构成；Q 表学习该状态下一次
//! GC 调用应复制多少页。

pub mod qtable;
pub mod state;

pub use qtable::QTable;
pub use state::State;
