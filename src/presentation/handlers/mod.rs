// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod download_handler;
pub mod file_handler;
pub mod monitor_handler;
