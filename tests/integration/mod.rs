//! Integration tests: descriptors on disk through the runtime facade

mod cancellation;
mod cli_contracts;
mod command_workflow;
mod invocation_graph;
mod registry_loading;
mod support;
mod trigger_dispatch;
