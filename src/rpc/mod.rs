pub mod komari_rpc;
