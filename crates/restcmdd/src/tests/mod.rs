//! Test suites for the command relay.

mod lib_api;
mod support;
mod unit;
