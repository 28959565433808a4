// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 已投递文件仓库（downloaded_file_repository）：文件、分片与失效清理
/// - 上传身份统计仓库（account_stats_repository）：负载均衡计数
pub mod account_stats_repository;
pub mod downloaded_file_repository;
