// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 包含任务提交、状态追踪等用例实现
pub mod dto;
pub mod status_tracker;
pub mod use_cases;
