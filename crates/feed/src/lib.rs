pub mod coinbase;
pub mod parser;
