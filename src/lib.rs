//! # DisclosureSim - Disclosure attack simulations against Tor-like overlays
//!
//! This library simulates a target client talking to a small set of servers
//! through an anonymizing overlay, and a passive adversary that tries to
//! reveal that set by correlating the client's completed requests with
//! server send activity.
//!
//! ## Overview
//!
//! Every replica is a single-threaded discrete-event simulation with its own
//! scheduler, seeded RNG, scenario and adversary. Replicas run in parallel on
//! a `rayon` pool and are reduced into a summary of time to deanonymize,
//! rounds, accuracy and classification errors.
//!
//! ## Architecture
//!
//! - `prob`: random variables (sampling, cdf, moments) and their config form
//! - `sim`: scheduler, delay queue, clients and servers, the network and
//!   round-model scenarios, and the replica run loop
//! - `attack`: the disclosure attack engine with its completion strategies
//!   and baseline inspector, plus the window-based intersection attack
//! - `config` / `config_loader`: YAML experiment files and validation
//! - `experiment`: parallel replicas, aggregation, sweeps and reports
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use disclosuresim::{config_loader, experiment};
//! use std::path::Path;
//!
//! let config = config_loader::load_config(Path::new("experiment.yaml"))?;
//! let batch = experiment::run_replicas(&config);
//! let summary = experiment::summarize(&config, &batch);
//! println!("accuracy: {:.2}", summary.target_server_set_accuracy);
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   seed: 1
//!   replicas: 100
//!   max_time: 100000
//!
//! scenario:
//!   type: network
//!   num_clients: 20
//!   num_servers: 20
//!   num_target_servers: 2
//!   network_delay: { type: uniform, min: 0.5, max: 1.5 }
//!   idle_time: { type: exponential, rate: 0.2 }
//!   msgs_per_request: { type: constant, value: 1 }
//!
//! adversary:
//!   type: disclosure
//!   strategy:
//!     max_stdev: 0.05
//!     detection_threshold: 0.2
//! ```
//!
//! ## Error Handling
//!
//! Library errors are `thiserror` enums. File-facing helpers and the binary
//! return `color_eyre::eyre::Result` with context attached.

pub mod attack;
pub mod config;
pub mod config_loader;
pub mod experiment;
pub mod prob;
pub mod sim;
