pub mod harness;
pub mod simulate;
pub mod worker;
