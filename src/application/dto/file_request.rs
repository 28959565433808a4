// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct FileLookupQuery {
    #[validate(length(min = 1, max = 128))]
    pub content_key: String,
    #[validate(length(min = 1, max = 32))]
    pub variant: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CleanupRequest {
    #[validate(length(min = 1, max = 512))]
    pub delivery_handle: String,
}
