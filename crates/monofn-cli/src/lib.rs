// Copyright 2025 monofn Authors
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

//! # monofn CLI
//!
//! Command-line interface for the monofn single-function runtime.
//!
//! This crate provides the main entry point for running monofn components:
//!
//! - **Runtime**: loads the handler script and serves `invoke` over JSON-RPC
//! - **Dashboard**: polls the result store and serves the aggregated view
//! - **Monitoring**: terminal view of a dashboard via the `top` command
//!
//! ## Key Commands
//!
//! - `monofn runtime`: Start the runtime worker
//! - `monofn dashboard`: Start the dashboard
//! - `monofn invoke`: Invoke the function once (outputs raw JSON for scripting)
//! - `monofn top`: Watch a dashboard in the terminal
//! - `monofn seed`: Write mock results to the store

pub mod client;
pub mod seed;
pub mod top;

/// Validates that a URL string starts with http:// or https://
pub fn validate_http_url(url: &str, description: &str) -> anyhow::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}
