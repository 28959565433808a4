// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

/// 运维通知渠道
///
/// 发送即忘：实现方必须自行吞掉失败，不向调用方传播。
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, text: &str);
}
