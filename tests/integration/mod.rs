// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod delivery_test;
pub mod dispatcher_test;
pub mod handlers_test;
pub mod helpers;
pub mod monitor_test;
pub mod pipeline_test;
pub mod repositories;
