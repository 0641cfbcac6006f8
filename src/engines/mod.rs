// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod chromium_engine;
pub mod request_queue;
pub mod reqwest_engine;
pub mod resource_broker;
pub mod traits;
