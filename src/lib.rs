// Copyright 2025 The seaflow contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! # seaflow
//!
//! A sea-of-nodes compiler middle-end: a graph IR together with the
//! algorithms that schedule it into executable order and progressively
//! rewrite high-level operations into primitives closer to the target.
//!
//! ## Architecture
//!
//! - [`ir`] - the graph model: fixed and floating nodes, input/usage edges,
//!   stamps, value numbering, structural verification
//! - [`location`] - canonical location identities for alias decisions, with
//!   a process-wide duplicate-rejecting registry
//! - [`schedule`] - block discovery, dominator/postdominator trees, and
//!   floating-node placement by policy
//! - [`lower`] - the canonicalizer, call-target devirtualization, guard
//!   management, and the fixed-point lowering pipeline
//! - [`providers`] - the narrow interfaces through which the core queries
//!   the surrounding runtime, plus the per-pass context
//! - [`events`] - the rewrite-event log
//! - [`probes`] - the line-indexed instrumentation probe map collaborator
//!
//! ## Example
//!
//! ```rust,ignore
//! use seaflow::prelude::*;
//!
//! let mut graph = Graph::new();
//! // ... build the fixed skeleton and floating values ...
//! let mut ctx = PhaseContext::new(&meta, &stamps).with_assumptions();
//! canonicalize(&mut graph, &mut ctx)?;
//! LoweringPhase::run(&mut graph, &mut ctx)?;
//! graph.verify()?;
//! ```
//!
//! One compilation unit owns its graph and runs the pipeline on a single
//! thread; only the [`location::LocationRegistry`] is shared between
//! concurrently compiling threads. Any detected structural invariant
//! violation aborts the compilation with [`Error::InvariantViolation`];
//! optimistic speculation failures are never compile-time errors, they are
//! recorded as [`providers::Assumptions`] for the runtime to re-validate.

#[macro_use]
mod error;

pub mod events;
pub mod ir;
pub mod location;
pub mod lower;
pub mod prelude;
pub mod probes;
pub mod providers;
pub mod schedule;
pub mod utils;

pub use error::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
