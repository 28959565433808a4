// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 下载任务的先进先出队列，存放在临时存储中
pub mod task_queue;

pub use task_queue::{QueueError, StoreTaskQueue, TaskQueue, DOWNLOAD_QUEUE_KEY};
