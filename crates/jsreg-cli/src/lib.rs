//! # jsreg-cli - Command Line Interface
//!
//! Runs the jsreg registry from the command line:
//!
//! - `jsreg validate --schema <schema> <data>...` runs each data file through
//!   the compiled pipeline and prints the result as JSON.
//! - `jsreg check <schema>...` compiles schemas, fetching any remote
//!   references, and reports which ones fail.
//!
//! Schemas, data files and configuration files may be JSON or YAML.
//!
//! ## Crate Policy
//!
//! - All schema work goes through `jsreg-schema`; this crate only loads
//!   files, builds configuration and renders results.
//! - Results go to stdout, logs go to stderr.
//! - Exit codes: 0 success, 1 validation or compile failure, 2 operational
//!   error.

pub mod check;
pub mod input;
pub mod validate;
