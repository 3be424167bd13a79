pub mod api_client;
pub(crate) mod jsonrpc;
pub mod rpc_client;
mod socket;
