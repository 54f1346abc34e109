//! Triage services: signature checks, rule evaluation, remediation and the
//! ledgers that record what happened.

pub mod action_executor;
pub mod audit_service;
pub mod failure_service;
pub mod github_service;
pub mod rule_engine;
