//! # 错误处理宏

/// 按变体名快速创建错误
///
/// 只适用于 `{ message, source: Option<_> }` 形状的变体。
#[macro_export]
macro_rules! error {
    ($kind:ident, $msg:expr) => {
        $crate::error::ProxyError::$kind {
            message: ::std::string::ToString::to_string(&$msg),
            source: None,
        }
    };
    ($kind:ident, $fmt:expr, $($arg:tt)*) => {
        $crate::error::ProxyError::$kind {
            message: format!($fmt, $($arg)*),
            source: None,
        }
    };
}

/// 快速创建配置错误的宏
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::ProxyError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ProxyError::config(format!($fmt, $($arg)*))
    };
}

/// 确保条件成立，否则返回配置错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::config_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::config_error!($fmt, $($arg)*));
        }
    };
}
