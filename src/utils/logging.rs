/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器
///
/// 默认 INFO 级别，可通过 RUST_LOG 覆盖
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();
}
