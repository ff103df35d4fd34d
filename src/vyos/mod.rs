// Copyright 2026 The vrboot Authors
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

//! Appliance configuration engine
//!
//! Directives, the live configuration snapshot, and submission of a batch
//! of directives to the engine.

pub mod apply;
pub mod config;
pub mod directive;

pub use self::apply::ScriptRunner;
pub use self::config::ConfigTree;
pub use self::directive::DirectiveBatch;
