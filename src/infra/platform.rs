//! # Platform Probe Module / 平台探测模块
//!
//! Answers the environment questions the engine resolves once per run:
//! which platform names describe the current host, whether a debugger is
//! attached, the ambient locale, and whether thread execution modes are
//! supported here.

use once_cell::sync::Lazy;
use sys_locale::get_locale;

use crate::core::metadata::ThreadMode;

/// The platform names the current host answers to, lowercase.
/// 当前主机响应的平台名称，小写。
static PLATFORM_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    let mut names = vec![
        std::env::consts::OS.to_string(),
        std::env::consts::ARCH.to_string(),
        format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
    ];
    if matches!(std::env::consts::OS, "linux" | "macos" | "freebsd" | "netbsd" | "openbsd") {
        names.push("unix".to_string());
    }
    if std::env::consts::OS == "macos" {
        names.push("osx".to_string());
    }
    if std::env::consts::OS == "windows" {
        names.push("win".to_string());
    }
    names
});

fn is_current(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    PLATFORM_NAMES.iter().any(|known| *known == name)
}

/// Evaluates a platform include/exclude declaration against the host.
/// An empty include list includes everything; exclusions win over inclusions.
///
/// 根据主机评估平台包含/排除声明。
/// 空的包含列表包含一切；排除优先于包含。
pub fn matches_platform(include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|name| is_current(name)) {
        return false;
    }
    include.is_empty() || include.iter().any(|name| is_current(name))
}

/// Thread execution modes are a foreign-runtime concept with no counterpart
/// on any platform this engine runs on.
pub fn supports_thread_mode(_mode: ThreadMode) -> bool {
    false
}

/// The ambient locale, falling back to the invariant `en-US`.
pub fn default_culture() -> String {
    get_locale().unwrap_or_else(|| "en-US".to_string())
}

/// Whether a debugger is attached to this process. On Linux this reads the
/// tracer pid from `/proc/self/status`; elsewhere it reports false.
/// Linux 上读取 `/proc/self/status` 中的跟踪进程号；其他平台报告 false。
pub fn debugger_attached() -> bool {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(value) = line.strip_prefix("TracerPid:") {
                    return value.trim() != "0";
                }
            }
        }
        false
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
