// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 定义核心流程依赖的外部协作方契约：
/// - 提取服务（extraction_service）：把来源地址解析为可合并的媒体清单
/// - 运维通知（notifier）：发送即忘的告警渠道
pub mod extraction_service;
pub mod notifier;
