pub mod assignment;
pub mod propagation;
