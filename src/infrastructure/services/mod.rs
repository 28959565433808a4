// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施服务模块
///
/// 提供外部协作方的 HTTP 实现
/// 包括提取服务客户端和运维通知
pub mod http_extractor;
pub mod notifier_impl;
