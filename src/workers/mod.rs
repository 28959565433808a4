// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供后台任务处理和工作器管理功能
/// 包括准入控制的调度循环、下载流水线、句柄校验和会话回收
pub mod dispatcher;
pub mod file_validator;
pub mod manager;
pub mod pipeline_executor;
pub mod session_reaper;

pub use dispatcher::{Dispatcher, DispatcherConfig, TaskRunner, ACTIVE_DOWNLOADS_KEY};
pub use file_validator::{FileValidator, ValidationReport, ValidatorConfig};
pub use manager::WorkerManager;
pub use pipeline_executor::{PipelineConfig, PipelineError, PipelineExecutor, PipelineOutcome};
pub use session_reaper::SessionReaper;
