// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod proxy_rotator;
pub mod rate_limit_monitor;

pub use proxy_rotator::{build_rotator, HttpProxyRotator, NoopRotator, ProxyRotator, RotationError};
pub use rate_limit_monitor::{HealthReporter, RateLimitConfig, RateLimitMonitor};
