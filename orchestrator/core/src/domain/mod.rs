// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Aggregates, value objects and boundary contracts of the broker.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Subject identity, download requests, remote/credential contracts

pub mod subject;
pub mod query;
pub mod download_request;
pub mod remote;
pub mod credential;
pub mod error;
pub mod repository;
pub mod broker_config;
