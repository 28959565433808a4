// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod account_pool;
pub mod client;
pub mod http_client;
pub mod service;
pub mod uploader;

pub use account_pool::{AccountLease, AccountPool, PoolError};
pub use client::{
    DeliveryClient, DeliveryCredential, DeliveryError, DeliveryIdentity, HandleStatus,
    UploadProgressFn,
};
pub use http_client::HttpDeliveryClient;
pub use service::{DeliveryFailure, DeliveryOutcome, DeliveryService, PartProgress};
pub use uploader::{UploadError, UploadPolicy, Uploader};
