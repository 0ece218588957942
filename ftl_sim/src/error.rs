use thiserror::Error;

/// Simulator specialized Result type.
/// 模拟器专用的 Result 类型。
pub type Result<T> = std::result::Result<T, Error>;

/// Simulator Error Enum. Both variants are fatal: the simulation state is
/// no longer meaningful once either is raised.
/// 模拟器错误枚举。两个变体都是致命的：一旦出现，模拟状态即失去意义。
#[derive(Error, Debug)]
pub enum Error {
  /// Rejected configuration, raised during initialization.
  /// 被拒绝的配置，在初始化期间抛出。
  #[error("invalid config: {0}")]
  Config(&'static str),
  /// Broken engine invariant, raised while running.
  /// 运行期间被破坏的引擎不变量。
  #[error("invariant violation: {0}")]
  Invariant(&'static str),
}
