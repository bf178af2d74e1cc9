// Public API types module
//
// Option structs that configure how the engine reaches the driver.

pub mod connect_options;

pub use connect_options::ConnectOptions;
