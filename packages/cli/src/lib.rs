#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Daily metric alert job.
//!
//! [`config`] loads the static configuration and the deployment
//! environment; [`run`] wires the fetch, baseline and dispatch
//! collaborators around the comparison engine.

pub mod config;
pub mod run;
