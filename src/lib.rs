//! tracecause - Rule-based performance diagnosis for recorded call trees
//!
//! This library takes one completed request trace (a tree of invocations with
//! timing and SQL statistics) and explains where its time went: the dominant
//! branch of the request, the operations wasting time in it, the invocation
//! responsible for calling them, and whether the cause is a single slow call,
//! a recursion, or a loop.
//!
//! # Architecture
//!
//! ```text
//! TraceSnapshot ──► InvocationTree ──► DiagnosisEngine ──► ProblemOccurrence ──► ResultSink
//!                                          │
//!                                  Tag Engine (plan + session)
//!                                          │
//!                                   diagnosis rule set
//! ```
//!
//! - [`engine`]: generic dependency-driven rule scheduler with fan-out
//! - [`rules`]: the five diagnosis rules
//! - [`aggregation`]: grouping of invocations by identity
//! - [`diagnosis`] / [`service`]: running sessions, one or many trees at a time

pub mod aggregation;
pub mod cli;
pub mod config;
pub mod diagnosis;
pub mod engine;
pub mod invocation;
pub mod report;
pub mod results;
pub mod rules;
pub mod service;
