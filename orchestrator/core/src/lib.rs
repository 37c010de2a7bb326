// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Session cache and download-request lifecycle core of the SAT bulk
//! download broker.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Exposes the domain, application, infrastructure and presentation layers

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
