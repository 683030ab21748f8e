pub mod framing;
pub mod memory;
pub mod turn;
