//! 日志初始化：RUST_LOG 覆盖默认过滤规则，无效时回退并告警。

use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 未设置 RUST_LOG 时使用的过滤规则。
pub const DEFAULT_LOG_FILTER: &str = "info";

/// 按给定指令构造过滤器，返回值第二项为被拒绝的指令。
fn env_filter(directives: Option<&str>) -> (EnvFilter, Option<String>) {
    match directives.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => match EnvFilter::try_new(value) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new(DEFAULT_LOG_FILTER), Some(value.to_string())),
        },
        None => (EnvFilter::new(DEFAULT_LOG_FILTER), None),
    }
}

/// 初始化 tracing 日志订阅。
pub fn init_logging() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (filter, rejected) = env_filter(directives.as_deref());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Some(rejected) = rejected {
        warn!(
            directives = %rejected,
            fallback = DEFAULT_LOG_FILTER,
            "invalid RUST_LOG, using default filter"
        );
    }
}
