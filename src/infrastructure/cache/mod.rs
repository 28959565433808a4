// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 缓存模块
///
/// 提供临时键值存储的抽象和实现
/// 包括Redis客户端和进程内实现
pub mod memory_store;
pub mod redis_client;
pub mod state_store;
