// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod policy_service;

pub use policy_service::{PolicyError, TenantPolicyService};
