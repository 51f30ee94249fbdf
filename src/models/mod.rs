pub mod change;
pub mod order;
pub mod rider;
