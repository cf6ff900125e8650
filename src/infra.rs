//! # Infrastructure Module / 基础设施模块
//!
//! This module provides environment services for Lattice Runner:
//! platform identification, locale detection and debugger probing.
//!
//! 此模块为 Lattice Runner 提供环境服务：
//! 平台识别、区域检测和调试器探测。

pub mod platform;
