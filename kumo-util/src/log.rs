//! 日志注册。库本身只产出 tracing 事件，由使用方决定订阅器。

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static REGISTER: Once = Once::new();

/// 注册一个输出到 stderr 的全局订阅器。重复调用只有第一次生效。
pub fn register_logger(level: Level) {
    REGISTER.call_once(|| {
        let layer = fmt::layer()
            .with_line_number(true)
            .with_thread_names(false)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry()
            .with(layer)
            .with(tracing_subscriber::filter::LevelFilter::from_level(level))
            .init();
    });
}

/// 在二进制或测试文件的顶层注册默认 logger。
/// 展开处会用到 `ctor`，调用方自己的 Cargo.toml 里要带上它。
///
/// 注意，这个注册了之后，所有的单元测试 mod 都会使用这个 logger，
/// 所以不要在测试 mod 里重复注册。
#[macro_export]
macro_rules! default_logger {
    ($level:expr) => {
        #[ctor::ctor]
        fn __default_logger_register() {
            $crate::log::register_logger($level);
        }
    };
}
