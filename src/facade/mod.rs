mod adapter;

pub use adapter::Adapter;
