//! # 错误处理宏

/// 快速创建配置错误的宏
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::GatewayError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::config(format!($fmt, $($arg)*))
    };
}

/// 快速创建网络错误的宏
#[macro_export]
macro_rules! network_error {
    ($msg:expr) => {
        $crate::error::GatewayError::network($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::network(format!($fmt, $($arg)*))
    };
}

/// 快速创建上游提供商错误的宏
#[macro_export]
macro_rules! provider_error {
    ($provider:expr, $msg:expr) => {
        $crate::error::GatewayError::provider($msg, $provider)
    };
    ($provider:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::provider(format!($fmt, $($arg)*), $provider)
    };
}

/// 快速创建无效请求错误的宏
#[macro_export]
macro_rules! invalid_request_error {
    ($msg:expr) => {
        $crate::error::GatewayError::invalid_request($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::invalid_request(format!($fmt, $($arg)*))
    };
}

/// 快速创建内部错误的宏
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::GatewayError::internal($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::internal(format!($fmt, $($arg)*))
    };
}

/// 快速创建网关错误的宏
#[macro_export]
macro_rules! bad_gateway_error {
    ($msg:expr) => {
        $crate::error::GatewayError::bad_gateway($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GatewayError::bad_gateway(format!($fmt, $($arg)*))
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
