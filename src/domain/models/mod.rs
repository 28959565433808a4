// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 下载任务（task）：排队、流水线阶段与状态视图
/// - 已投递文件（downloaded_file）：文件与分片记录
/// - 上传身份统计（upload_account）：负载均衡所需的计数与跨日规则
/// - 限流（rate_limit）：健康信号与限流事件
pub mod downloaded_file;
pub mod rate_limit;
pub mod task;
pub mod upload_account;
