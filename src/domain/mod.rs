// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务概念，包括：
/// - 领域模型（models）：任务、文件、身份统计、限流事件
/// - 仓库接口（repositories）：数据持久化抽象接口
/// - 服务（services）：外部协作方契约
pub mod models;
pub mod repositories;
pub mod services;
