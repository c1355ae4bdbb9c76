// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Scope model, cascade merge rules and the three policy evaluators.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure evaluation; every function here is deterministic over its inputs

pub mod scope;
pub mod merge;
pub mod settings;
pub mod guardrail;
pub mod mcp;
pub mod events;
pub mod repository;
pub mod config;
