// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`sat-broker-core`)
//!
//! HTTP surface that translates external requests into application service
//! calls. No business logic lives here; all real work is delegated to
//! `crate::application`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Login, request submission/verification, package download |

pub mod api;
