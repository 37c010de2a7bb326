// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod db;
pub mod sat_gateway;
pub mod session_token;

pub use sat_gateway::{GatewaySession, HttpSatGateway};
pub use session_token::{IssuedToken, SessionTokenIssuer};
