//! Interactive shift roster optimization engine.
//!
//! Scores staff × day shift schedules against weighted rules, attributes
//! every penalty to the cells that caused it, and searches for better
//! schedules with a genetic solver running off the interactive thread.
//!
//! # Domain Model
//!
//! - [`Staff`](domain::Staff): a rostered person with targets, pins and requests
//! - [`ScheduleMatrix`](domain::ScheduleMatrix): row-major shift codes per staff and day
//! - [`ConstraintRule`](rules::ConstraintRule): a weighted rule over a closed set of kinds
//! - [`HistoryStore`](store::HistoryStore): the live roster with undo/redo
//!
//! # Search
//!
//! - [`GeneticSolver`](solver::GeneticSolver): elitist tournament search over schedules
//! - [`OptimizationSession`](session::OptimizationSession): batch loop on a worker
//!   thread, with epochs to discard stale results

pub mod api;
pub mod config;
pub mod console;
pub mod constraints;
pub mod demo_data;
pub mod domain;
pub mod dto;
pub mod error;
pub mod interchange;
pub mod rules;
pub mod session;
pub mod share;
pub mod solver;
pub mod store;
