// Copyright (c) 2025 Snowflake Rust Driver Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Type definitions organized by domain:
//! - `wire`: REST request/response models
//! - `options`: request options and downloader configuration

pub mod options;
pub mod wire;

pub use options::{DownloaderConfig, DriverConfig, QueryOptions};
pub use wire::{
    ExecRequest, ExecResponse, ExecResponseChunk, ExecResponseData, ResultFormat, RowType,
    StatusRecord, StatusResponse,
};
