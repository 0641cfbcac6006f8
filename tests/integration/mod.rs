// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod helpers;
pub mod request_queue_test;
pub mod resource_broker_test;
pub mod xml_feed_test;
