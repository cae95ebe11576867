//! Integration tests for the minidocs generate/evaluate/refine loop

mod cli_routes;
mod config_loading;
mod provider_http;
mod support;
mod workflow_runs;
