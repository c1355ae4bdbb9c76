// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Strata Policy Core
//!
//! Resolves the effective feature settings, guardrails and MCP server set for a
//! request scoped to an organization, team and user.
//!
//! # Architecture
//!
//! - **Domain:** pure evaluation over per-level records (no I/O, no logging)
//! - **Application:** fetches records, evaluates, logs and audits
//! - **Infrastructure:** in-memory stores, audit sinks, snapshot loading

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
