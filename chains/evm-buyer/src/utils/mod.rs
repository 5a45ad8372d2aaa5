pub mod gas;

pub use gas::{eth_to_wei, format_eth, format_token, gas_reserve_wei, to_base_units};
