// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod account_stats_repository_test;
pub mod downloaded_file_repository_test;
